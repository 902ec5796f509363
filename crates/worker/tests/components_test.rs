mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use scheduler_core::{HandleCallbackParam, REGISTRY_GROUP_EXECUTOR, SUCCESS_CODE};
use scheduler_worker::{CallbackReporter, RegistryHeartbeat};

use common::RecordingAdminClient;

fn callback(log_id: i64) -> HandleCallbackParam {
    HandleCallbackParam {
        log_id,
        log_date_time: 0,
        handle_code: SUCCESS_CODE,
        handle_msg: String::new(),
    }
}

#[tokio::test]
async fn test_heartbeat_registers_and_removes_on_shutdown() {
    let admin = RecordingAdminClient::new();
    let heartbeat = RegistryHeartbeat::new(
        admin.clone(),
        "sample-app",
        "http://127.0.0.1:9999/",
        Duration::from_millis(50),
    );
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { heartbeat.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(180)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    let registered = admin.registered.lock().unwrap().clone();
    assert!(registered.len() >= 2);
    assert_eq!(registered[0].registry_group, REGISTRY_GROUP_EXECUTOR);
    assert_eq!(registered[0].registry_key, "sample-app");
    assert_eq!(registered[0].registry_value, "http://127.0.0.1:9999/");

    let removed = admin.removed.lock().unwrap().clone();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0], registered[0]);
}

#[tokio::test]
async fn test_callback_reporter_retries_failed_batch() {
    let admin = RecordingAdminClient::new();
    *admin.fail_callbacks.lock().unwrap() = 1;

    let reporter = CallbackReporter::new(admin.clone(), Duration::from_millis(20));
    let (tx, rx) = mpsc::unbounded_channel();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tx.send(callback(1)).unwrap();
    tx.send(callback(2)).unwrap();

    let handle = tokio::spawn(async move { reporter.run(rx, shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(callback(3)).unwrap();
    drop(tx);
    handle.await.unwrap();

    assert_eq!(admin.callback_log_ids(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_callback_reporter_flushes_on_shutdown() {
    let admin = RecordingAdminClient::new();
    let reporter = Arc::new(CallbackReporter::new(admin.clone(), Duration::from_secs(60)));
    // 第一次上报失败后进入长时间等待，关闭信号触发最后一次上报
    *admin.fail_callbacks.lock().unwrap() = 1;

    let (tx, rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tx.send(callback(7)).unwrap();

    let task = Arc::clone(&reporter);
    let handle = tokio::spawn(async move { task.run(rx, shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(admin.callback_log_ids(), vec![7]);
}
