pub mod config;
pub mod errors;
pub mod logging;
pub mod models;

pub use config::models::{AdminConfig, AppConfig, DatabaseConfig, ExecutorConfig, ObservabilityConfig};
pub use errors::*;
pub use models::message::*;

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
