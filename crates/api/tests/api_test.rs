use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::json;
use tower::ServiceExt;

use scheduler_api::{create_app, AppState};
use scheduler_core::{
    IdleBeatParam, KillParam, LogParam, ReturnT, SchedulerResult, TriggerParam,
    ACCESS_TOKEN_HEADER, FAIL_CODE, SUCCESS_CODE,
};
use scheduler_dispatcher::{JobController, JobTrigger};
use scheduler_domain::{
    AddressType, ExecutorClient, JobGroup, JobGroupRepository, JobInfo, JobInfoRepository,
    JobLog, JobLogRepository, TriggerStatus,
};
use scheduler_infrastructure::{InMemoryStore, MetricsCollector};

const TOKEN: &str = "admin-token";

#[derive(Default)]
struct RecordingExecutorClient {
    runs: Mutex<Vec<(String, TriggerParam)>>,
}

#[async_trait]
impl ExecutorClient for RecordingExecutorClient {
    async fn beat(&self, _address: &str) -> SchedulerResult<ReturnT> {
        Ok(ReturnT::success())
    }

    async fn idle_beat(&self, _address: &str, _param: &IdleBeatParam) -> SchedulerResult<ReturnT> {
        Ok(ReturnT::success())
    }

    async fn run(&self, address: &str, param: &TriggerParam) -> SchedulerResult<ReturnT> {
        self.runs
            .lock()
            .unwrap()
            .push((address.to_string(), param.clone()));
        Ok(ReturnT::success())
    }

    async fn kill(&self, _address: &str, _param: &KillParam) -> SchedulerResult<ReturnT> {
        Ok(ReturnT::success())
    }

    async fn log(&self, _address: &str, _param: &LogParam) -> SchedulerResult<ReturnT> {
        Ok(ReturnT::success())
    }
}

struct Fixture {
    app: Router,
    store: InMemoryStore,
    client: Arc<RecordingExecutorClient>,
}

fn fixture() -> Fixture {
    let store = InMemoryStore::new();
    let client = Arc::new(RecordingExecutorClient::default());
    let metrics = Arc::new(MetricsCollector::new());
    let trigger = JobTrigger::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        client.clone(),
        metrics.clone(),
    );
    let controller = JobController::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        trigger,
        5000,
        metrics,
    );
    let state = AppState {
        registry_repo: Arc::new(store.clone()),
        controller: Arc::new(controller),
    };
    Fixture {
        app: create_app(state, TOKEN),
        store,
        client,
    }
}

fn post(path: &str, body: impl Into<Body>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header(ACCESS_TOKEN_HEADER, token);
    }
    builder.body(body.into()).unwrap()
}

async fn call(app: &Router, request: Request<Body>) -> ReturnT {
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create_job(store: &InMemoryStore, job: JobInfo) -> JobInfo {
    let group = JobGroupRepository::create(
        store,
        &JobGroup::new("sample", AddressType::Manual).with_addresses(&["http://10.0.0.1:9999/"]),
    )
    .await
    .unwrap();
    let job = JobInfo {
        job_group: group.id,
        ..job
    };
    JobInfoRepository::create(store, &job).await.unwrap()
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let fixture = fixture();
    let response = fixture
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_registry_requires_token() {
    let fixture = fixture();
    let body = json!({
        "registryGroup": "EXECUTOR",
        "registryKey": "sample",
        "registryValue": "http://10.0.0.1:9999/"
    })
    .to_string();

    let ret = call(&fixture.app, post("/api/registry", body.clone(), Some("wrong"))).await;
    assert_eq!(ret.code, FAIL_CODE);
    assert!(fixture.store.registries().is_empty());

    let ret = call(&fixture.app, post("/api/registry", body.clone(), Some(TOKEN))).await;
    assert_eq!(ret.code, SUCCESS_CODE);
    let ret = call(&fixture.app, post("/api/registry", body.clone(), Some(TOKEN))).await;
    assert_eq!(ret.code, SUCCESS_CODE);

    let registries = fixture.store.registries();
    assert_eq!(registries.len(), 1);
    assert_eq!(registries[0].registry_key, "sample");

    let ret = call(&fixture.app, post("/api/registryRemove", body, Some(TOKEN))).await;
    assert_eq!(ret.code, SUCCESS_CODE);
    assert!(fixture.store.registries().is_empty());
}

#[tokio::test]
async fn test_registry_rejects_bad_body() {
    let fixture = fixture();

    let ret = call(&fixture.app, post("/api/registry", "{oops", Some(TOKEN))).await;
    assert_eq!(ret.code, FAIL_CODE);

    let body = json!({"registryGroup": "EXECUTOR", "registryKey": "sample", "registryValue": ""});
    let ret = call(&fixture.app, post("/api/registry", body.to_string(), Some(TOKEN))).await;
    assert_eq!(ret.code, FAIL_CODE);
    assert!(fixture.store.registries().is_empty());
}

#[tokio::test]
async fn test_callback_updates_log() {
    let fixture = fixture();
    let log = JobLogRepository::create(&fixture.store, &JobLog::new(1, 1, Utc::now()))
        .await
        .unwrap();

    let body = json!([
        {"logId": log.id, "logDateTime": 0, "handleCode": 200, "handleMsg": "done"},
        {"logId": 9999, "logDateTime": 0, "handleCode": 500, "handleMsg": "missing"}
    ]);
    let ret = call(&fixture.app, post("/api/callback", body.to_string(), Some(TOKEN))).await;
    assert_eq!(ret.code, SUCCESS_CODE);

    let stored = &fixture.store.logs()[0];
    assert_eq!(stored.handle_code, 200);
    assert_eq!(stored.handle_msg, "done");
    assert!(stored.handle_time.is_some());
}

#[tokio::test]
async fn test_start_and_stop_job() {
    let fixture = fixture();
    let job = create_job(&fixture.store, JobInfo::new(0, "demo").with_cron("0/5 * * * * ?")).await;

    let ret = call(
        &fixture.app,
        post("/api/jobinfo/start", json!({"id": job.id}).to_string(), Some(TOKEN)),
    )
    .await;
    assert_eq!(ret.code, SUCCESS_CODE, "{}", ret.message());
    let next = ret.content.unwrap()["triggerNextTime"].as_i64().unwrap();
    assert!(next > Utc::now().timestamp_millis());

    let stored = JobInfoRepository::find_by_id(&fixture.store, job.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.trigger_status, TriggerStatus::Running);

    let ret = call(
        &fixture.app,
        post("/api/jobinfo/stop", json!({"id": job.id}).to_string(), Some(TOKEN)),
    )
    .await;
    assert_eq!(ret.code, SUCCESS_CODE);
    let stored = JobInfoRepository::find_by_id(&fixture.store, job.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.trigger_status, TriggerStatus::Stopped);
    assert_eq!(stored.trigger_next_time, 0);
}

#[tokio::test]
async fn test_start_rejects_none_schedule_and_missing_job() {
    let fixture = fixture();
    let job = create_job(&fixture.store, JobInfo::new(0, "demo")).await;

    let ret = call(
        &fixture.app,
        post("/api/jobinfo/start", json!({"id": job.id}).to_string(), Some(TOKEN)),
    )
    .await;
    assert_eq!(ret.code, FAIL_CODE);

    let ret = call(
        &fixture.app,
        post("/api/jobinfo/start", json!({"id": 404}).to_string(), Some(TOKEN)),
    )
    .await;
    assert_eq!(ret.code, FAIL_CODE);
    assert!(ret.message().contains("404"));
}

#[tokio::test]
async fn test_manual_trigger_dispatches_to_executor() {
    let fixture = fixture();
    let job = create_job(&fixture.store, JobInfo::new(0, "demo")).await;

    let body = json!({"id": job.id, "executorParam": "manual-param"});
    let ret = call(&fixture.app, post("/api/jobinfo/trigger", body.to_string(), Some(TOKEN))).await;
    assert_eq!(ret.code, SUCCESS_CODE);

    for _ in 0..100 {
        if !fixture.client.runs.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let runs = fixture.client.runs.lock().unwrap().clone();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].0, "http://10.0.0.1:9999/");
    assert_eq!(runs[0].1.executor_params, "manual-param");
}
