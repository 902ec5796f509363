use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("任务未找到: {id}")]
    JobNotFound { id: i64 },

    #[error("执行器分组未找到: {id}")]
    JobGroupNotFound { id: i64 },

    #[error("调度日志未找到: {id}")]
    JobLogNotFound { id: i64 },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("无效的调度配置: {0}")]
    InvalidScheduleConf(String),

    #[error("时间轮容量不足: 触发时间距当前 {delay_seconds} 秒, 时间轮仅覆盖 {slot_count} 秒")]
    TimeWheelCapacityExceeded { delay_seconds: i64, slot_count: usize },

    #[error("没有可用的执行器地址")]
    NoAvailableExecutor,

    #[error("执行器处理器未找到: {0}")]
    HandlerNotFound(String),

    #[error("功能未实现: {0}")]
    NotImplemented(String),

    #[error("执行器繁忙: {0}")]
    ExecutorBusy(String),

    #[error("访问令牌错误")]
    AccessDenied,

    #[error("任务执行超时")]
    ExecutionTimeout,

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn network_error<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    pub fn not_implemented<S: Into<String>>(what: S) -> Self {
        Self::NotImplemented(what.into())
    }

    /// 基础设施类的瞬时错误，下一个周期可以重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::DatabaseOperation(_) | Self::Network(_) | Self::ExecutionTimeout
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
