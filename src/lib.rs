// 公开导出的模块，供外部使用
pub mod models;
pub mod errors;
pub mod config;
pub mod schema;
pub mod cleaner;
pub mod aggregator;
pub mod data_provider;
pub mod presenter;
pub mod services;

#[doc(hidden)]
pub mod util;

// 重新导出常用类型，方便使用
pub use models::record::{RawRecord, CleanRecord};
pub use models::aggregate::{AggregateRow, DailyAverage, TickerAverage};
pub use config::Config;
pub use data_provider::AggregateProvider;
pub use services::pipeline_service::{PipelineService, RunReport};
pub use errors::{Result, PipelineError};
