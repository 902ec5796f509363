use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, warn};

use scheduler_core::{ReturnT, ACCESS_TOKEN_HEADER};

pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    debug!(
        "完成请求处理: {} {} - 状态: {} - 耗时: {:?}",
        method,
        uri,
        response.status(),
        start.elapsed()
    );
    response
}

/// 配置了令牌时校验 `XXL-JOB-ACCESS-TOKEN` 请求头
pub async fn require_access_token(
    State(access_token): State<Arc<str>>,
    request: Request,
    next: Next,
) -> Response {
    if !access_token.is_empty() {
        let provided = request
            .headers()
            .get(ACCESS_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(&*access_token) {
            warn!("访问令牌错误: {}", request.uri().path());
            return Json(ReturnT::fail("The access token is wrong.")).into_response();
        }
    }
    next.run(request).await
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

pub fn trace_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
}
