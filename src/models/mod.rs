pub mod record;
pub mod aggregate;
