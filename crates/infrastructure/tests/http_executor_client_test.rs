use std::time::Duration;

use axum::{
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use scheduler_core::{
    IdleBeatParam, KillParam, ReturnT, TriggerParam, ACCESS_TOKEN_HEADER, FAIL_CODE,
};
use scheduler_domain::ExecutorClient;
use scheduler_infrastructure::HttpExecutorClient;

const TOKEN: &str = "token-1";

fn token_ok(headers: &HeaderMap) -> bool {
    headers
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        == Some(TOKEN)
}

async fn run(headers: HeaderMap, Json(body): Json<Value>) -> Json<ReturnT> {
    if !token_ok(&headers) {
        return Json(ReturnT::fail("The access token is wrong."));
    }
    Json(ReturnT::success_with(json!({
        "jobId": body["jobId"],
        "handler": body["executorHandler"],
        "shard": format!("{}/{}", body["broadcastIndex"], body["broadcastTotal"]),
    })))
}

async fn beat(headers: HeaderMap) -> Json<ReturnT> {
    if token_ok(&headers) {
        Json(ReturnT::success())
    } else {
        Json(ReturnT::fail("The access token is wrong."))
    }
}

async fn idle_beat(Json(body): Json<Value>) -> Json<ReturnT> {
    Json(ReturnT::fail(format!("job {} is running", body["jobId"])))
}

async fn kill() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn spawn_executor() -> String {
    let app = Router::new()
        .route("/run", post(run))
        .route("/beat", post(beat))
        .route("/idleBeat", post(idle_beat))
        .route("/kill", post(kill));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

fn trigger_param() -> TriggerParam {
    TriggerParam {
        job_id: 42,
        executor_handler: "demoJobHandler".to_string(),
        executor_params: String::new(),
        executor_block_strategy: "SERIAL_EXECUTION".to_string(),
        executor_timeout: 0,
        log_id: 1,
        log_date_time: 1_700_000_000,
        glue_type: "BEAN".to_string(),
        glue_source: String::new(),
        glue_update_time: 0,
        broadcast_index: 1,
        broadcast_total: 3,
    }
}

#[tokio::test]
async fn test_run_sends_token_and_camel_case_body() {
    let address = spawn_executor().await;
    let client = HttpExecutorClient::new(TOKEN, Duration::from_secs(3)).unwrap();

    let ret = client.run(&address, &trigger_param()).await.unwrap();
    assert!(ret.is_success(), "{}", ret.message());
    let content = ret.content.unwrap();
    assert_eq!(content["jobId"], 42);
    assert_eq!(content["handler"], "demoJobHandler");
    assert_eq!(content["shard"], "1/3");
}

#[tokio::test]
async fn test_wrong_token_is_business_failure() {
    let address = spawn_executor().await;
    let client = HttpExecutorClient::new("other", Duration::from_secs(3)).unwrap();

    let ret = client.beat(&address).await.unwrap();
    assert_eq!(ret.code, FAIL_CODE);
    assert!(ret.message().contains("access token"));
}

#[tokio::test]
async fn test_idle_beat_busy_and_http_error_status() {
    let address = spawn_executor().await;
    let client = HttpExecutorClient::new(TOKEN, Duration::from_secs(3)).unwrap();

    let ret = client
        .idle_beat(&address, &IdleBeatParam { job_id: 7 })
        .await
        .unwrap();
    assert!(!ret.is_success());
    assert!(ret.message().contains('7'));

    let ret = client
        .kill(&address, &KillParam { job_id: 7 })
        .await
        .unwrap();
    assert_eq!(ret.code, FAIL_CODE);
    assert!(ret.message().contains("500"));
}

#[tokio::test]
async fn test_unreachable_executor_is_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpExecutorClient::new(TOKEN, Duration::from_secs(1)).unwrap();
    let result = client.beat(&format!("http://{addr}/")).await;
    assert!(result.is_err());
}
