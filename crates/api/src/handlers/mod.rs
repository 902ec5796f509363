pub mod callback;
pub mod health;
pub mod jobinfo;
pub mod registry;

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// 按 JSON 解析请求体，格式错误转换为失败的 `ReturnT`
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}
