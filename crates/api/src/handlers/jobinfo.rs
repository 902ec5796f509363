use axum::{body::Bytes, extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use scheduler_core::ReturnT;

use super::parse_body;
use crate::error::ApiResult;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerJobRequest {
    pub id: i64,
    #[serde(default)]
    pub executor_param: Option<String>,
    #[serde(default)]
    pub address_list: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JobIdRequest {
    pub id: i64,
}

/// 手动触发一次任务
pub async fn trigger_job(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ReturnT>> {
    let request: TriggerJobRequest = parse_body(&body)?;
    state
        .controller
        .trigger_job(request.id, request.executor_param, request.address_list)
        .await?;
    Ok(Json(ReturnT::success()))
}

pub async fn start_job(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ReturnT>> {
    let request: JobIdRequest = parse_body(&body)?;
    let job = state.controller.start_job(request.id, Utc::now()).await?;
    Ok(Json(ReturnT::success_with(json!({
        "id": job.id,
        "triggerNextTime": job.trigger_next_time,
    }))))
}

pub async fn stop_job(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ReturnT>> {
    let request: JobIdRequest = parse_body(&body)?;
    state.controller.stop_job(request.id).await?;
    Ok(Json(ReturnT::success()))
}
