//! 调度中心管理接口
//!
//! 执行器通过 `/api/registry`、`/api/registryRemove` 维持注册，通过 `/api/callback` 上报执行结果；
//! `/api/jobinfo/*` 提供手动触发、启动、停止任务的操作。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

use axum::Router;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建完整的管理接口应用
pub fn create_app(state: AppState, access_token: &str) -> Router {
    create_routes(state, access_token).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
