use axum::{body::Bytes, extract::State, Json};
use chrono::Utc;

use scheduler_core::{HandleCallbackParam, ReturnT};

use super::parse_body;
use crate::error::ApiResult;
use crate::routes::AppState;

/// 执行结果回调
pub async fn callback(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ReturnT>> {
    let callbacks: Vec<HandleCallbackParam> = parse_body(&body)?;
    state
        .controller
        .handle_callbacks(&callbacks, Utc::now())
        .await?;
    Ok(Json(ReturnT::success()))
}
