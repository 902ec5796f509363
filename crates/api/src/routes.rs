use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use scheduler_dispatcher::JobController;
use scheduler_domain::JobRegistryRepository;

use crate::handlers::{
    callback::callback,
    health::health_check,
    jobinfo::{start_job, stop_job, trigger_job},
    registry::{registry, registry_remove},
};
use crate::middleware::require_access_token;

/// 管理接口状态
#[derive(Clone)]
pub struct AppState {
    pub registry_repo: Arc<dyn JobRegistryRepository>,
    pub controller: Arc<JobController>,
}

/// 创建管理接口路由
///
/// `/api/*` 需要访问令牌，`/health` 不需要。
pub fn create_routes(state: AppState, access_token: &str) -> Router {
    let api = Router::new()
        .route("/api/registry", post(registry))
        .route("/api/registryRemove", post(registry_remove))
        .route("/api/callback", post(callback))
        .route("/api/jobinfo/trigger", post(trigger_job))
        .route("/api/jobinfo/start", post(start_job))
        .route("/api/jobinfo/stop", post(stop_job))
        .layer(middleware::from_fn_with_state(
            Arc::<str>::from(access_token),
            require_access_token,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .with_state(state)
}
