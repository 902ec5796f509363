use axum::{
    response::{IntoResponse, Response},
    Json,
};
use scheduler_core::{ReturnT, SchedulerError};
use tracing::warn;

/// 管理接口错误
///
/// 所有错误都以失败的 [`ReturnT`] 返回，HTTP 状态码保持 200。
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Scheduler(#[from] SchedulerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn to_return_t(&self) -> ReturnT {
        match self {
            ApiError::Scheduler(SchedulerError::JobNotFound { id }) => {
                ReturnT::fail(format!("任务 {id} 不存在"))
            }
            other => ReturnT::fail(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Scheduler(e) = &self {
            warn!("管理接口处理失败: {}", e);
        }
        Json(self.to_return_t()).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_to_return_t() {
        let ret = ApiError::Scheduler(SchedulerError::JobNotFound { id: 9 }).to_return_t();
        assert!(!ret.is_success());
        assert!(ret.message().contains('9'));

        let ret = ApiError::BadRequest("id".to_string()).to_return_t();
        assert!(ret.message().contains("id"));
    }
}
