use axum::{body::Bytes, extract::State, Json};
use chrono::Utc;
use tracing::{debug, info};

use scheduler_core::{RegistryParam, ReturnT};

use super::parse_body;
use crate::error::{ApiError, ApiResult};
use crate::routes::AppState;

fn parse_registry(body: &Bytes) -> ApiResult<RegistryParam> {
    let param: RegistryParam = parse_body(body)?;
    if !param.is_valid() {
        return Err(ApiError::BadRequest("注册参数不能为空".to_string()));
    }
    Ok(param)
}

/// 执行器注册心跳
pub async fn registry(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ReturnT>> {
    let param = parse_registry(&body)?;
    state.registry_repo.upsert(&param, Utc::now()).await?;
    debug!(
        "执行器注册: {} {} {}",
        param.registry_group, param.registry_key, param.registry_value
    );
    Ok(Json(ReturnT::success()))
}

/// 执行器注销
pub async fn registry_remove(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<ReturnT>> {
    let param = parse_registry(&body)?;
    let removed = state.registry_repo.remove(&param).await?;
    info!(
        "执行器注销: {} {}, 删除 {} 条",
        param.registry_key, param.registry_value, removed
    );
    Ok(Json(ReturnT::success()))
}
