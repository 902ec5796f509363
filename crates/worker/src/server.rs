//! 执行器 HTTP 接口
//!
//! 请求体按字节读取后自行解析，格式错误与令牌错误都以失败的 `ReturnT` 返回，状态码保持 200。

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::de::DeserializeOwned;
use tower_http::trace::TraceLayer;
use tracing::warn;

use scheduler_core::{
    IdleBeatParam, KillParam, LogParam, ReturnT, TriggerParam, ACCESS_TOKEN_HEADER,
};

use crate::executor_biz::ExecutorBiz;

#[derive(Clone)]
pub struct ServerState {
    biz: ExecutorBiz,
    access_token: Arc<str>,
}

impl ServerState {
    pub fn new(biz: ExecutorBiz, access_token: impl Into<String>) -> Self {
        Self {
            biz,
            access_token: Arc::from(access_token.into()),
        }
    }
}

pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/beat", post(beat))
        .route("/idleBeat", post(idle_beat))
        .route("/run", post(run))
        .route("/kill", post(kill))
        .route("/log", post(log))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_access_token,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 配置了令牌时校验请求头
async fn require_access_token(
    State(state): State<ServerState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.access_token.is_empty() {
        let provided = request
            .headers()
            .get(ACCESS_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(&*state.access_token) {
            warn!("Rejected request with wrong access token: {}", request.uri().path());
            return Json(ReturnT::fail("The access token is wrong.")).into_response();
        }
    }
    next.run(request).await
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ReturnT> {
    serde_json::from_slice(body).map_err(|e| ReturnT::fail(format!("请求参数格式错误: {e}")))
}

async fn beat(State(state): State<ServerState>) -> Json<ReturnT> {
    Json(state.biz.beat())
}

async fn idle_beat(State(state): State<ServerState>, body: Bytes) -> Json<ReturnT> {
    match parse_body::<IdleBeatParam>(&body) {
        Ok(param) => Json(state.biz.idle_beat(param).await),
        Err(ret) => Json(ret),
    }
}

async fn run(State(state): State<ServerState>, body: Bytes) -> Json<ReturnT> {
    match parse_body::<TriggerParam>(&body) {
        Ok(param) => Json(state.biz.run(param).await),
        Err(ret) => Json(ret),
    }
}

async fn kill(State(state): State<ServerState>, body: Bytes) -> Json<ReturnT> {
    match parse_body::<KillParam>(&body) {
        Ok(param) => Json(state.biz.kill(param).await),
        Err(ret) => Json(ret),
    }
}

async fn log(State(state): State<ServerState>, body: Bytes) -> Json<ReturnT> {
    match parse_body::<LogParam>(&body) {
        Ok(param) => Json(state.biz.log(param)),
        Err(ret) => Json(ret),
    }
}
