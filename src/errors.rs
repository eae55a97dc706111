use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    #[error("Date parsing error: {0}")]
    DateError(#[from] chrono::ParseError),

    // 结构不符属于致命错误，不允许带着错列继续往下游走
    #[error("Schema mismatch in {table}: {detail}")]
    SchemaMismatch { table: String, detail: String },

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn schema_mismatch(table: &str, detail: impl Into<String>) -> Self {
        PipelineError::SchemaMismatch {
            table: table.to_string(),
            detail: detail.into(),
        }
    }
}
