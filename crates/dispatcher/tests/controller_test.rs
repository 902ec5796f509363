mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{create_test_metrics, create_trigger, RecordingExecutorClient};
use scheduler_core::{HandleCallbackParam, SchedulerError};
use scheduler_dispatcher::JobController;
use scheduler_domain::{
    AddressType, JobGroup, JobGroupRepository, JobInfo, JobInfoRepository, JobLog,
    JobLogRepository, ScheduleLockManager, TriggerStatus,
};
use scheduler_infrastructure::InMemoryStore;

fn controller(store: &InMemoryStore, client: Arc<RecordingExecutorClient>) -> JobController {
    JobController::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        create_trigger(store, client),
        5_000,
        create_test_metrics(),
    )
}

#[tokio::test]
async fn test_start_and_stop_job() {
    let store = InMemoryStore::new();
    let controller = controller(&store, RecordingExecutorClient::new());
    let job = JobInfoRepository::create(&store, &JobInfo::new(1, "demo").with_fix_rate(10_000))
        .await
        .unwrap();
    let now = Utc::now();

    let started = controller.start_job(job.id, now).await.unwrap();
    assert_eq!(started.trigger_status, TriggerStatus::Running);
    assert_eq!(started.trigger_next_time, now.timestamp_millis() + 15_000);

    let stopped = controller.stop_job(job.id).await.unwrap();
    assert_eq!(stopped.trigger_status, TriggerStatus::Stopped);
    let stored = JobInfoRepository::find_by_id(&store, job.id).await.unwrap().unwrap();
    assert_eq!(stored.trigger_next_time, 0);
}

#[tokio::test]
async fn test_stop_waits_for_scan_and_is_not_overwritten() {
    let store = InMemoryStore::new();
    let controller = Arc::new(controller(&store, RecordingExecutorClient::new()));
    let job = JobInfoRepository::create(
        &store,
        &JobInfo::new(1, "demo").with_fix_rate(1000).running_at(1000),
    )
    .await
    .unwrap();

    // 扫描持锁期间读到任务并推进触发时间
    let mut scan = ScheduleLockManager::acquire(&store).await.unwrap();
    let mut due = scan.find_schedulable(5000).await.unwrap().remove(0);

    let stopping = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.stop_job(job.id).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopping.is_finished());

    due.trigger_last_time = 1000;
    due.trigger_next_time = 2000;
    scan.update_trigger_time(&due).await.unwrap();
    scan.commit().await.unwrap();

    let stopped = stopping.await.unwrap().unwrap();
    assert_eq!(stopped.trigger_status, TriggerStatus::Stopped);
    let stored = JobInfoRepository::find_by_id(&store, job.id).await.unwrap().unwrap();
    assert_eq!(stored.trigger_status, TriggerStatus::Stopped);
    assert_eq!(stored.trigger_next_time, 0);
}

#[tokio::test]
async fn test_start_rejects_none_schedule_and_missing_job() {
    let store = InMemoryStore::new();
    let controller = controller(&store, RecordingExecutorClient::new());
    let job = JobInfoRepository::create(&store, &JobInfo::new(1, "demo")).await.unwrap();

    assert!(matches!(
        controller.start_job(job.id, Utc::now()).await,
        Err(SchedulerError::InvalidScheduleConf(_))
    ));
    assert!(matches!(
        controller.start_job(999, Utc::now()).await,
        Err(SchedulerError::JobNotFound { id: 999 })
    ));
}

#[tokio::test]
async fn test_manual_trigger_reaches_executor() {
    let store = InMemoryStore::new();
    let client = RecordingExecutorClient::new();
    let controller = controller(&store, client.clone());
    let group = JobGroupRepository::create(
        &store,
        &JobGroup::new("app", AddressType::Auto).with_addresses(&["http://a:9999/"]),
    )
    .await
    .unwrap();
    let job = JobInfoRepository::create(&store, &JobInfo::new(group.id, "demo"))
        .await
        .unwrap();

    controller
        .trigger_job(job.id, Some("p=1".to_string()), None)
        .await
        .unwrap();

    let runs = client.wait_for_runs(1).await;
    assert_eq!(runs[0].1.executor_params, "p=1");
}

#[tokio::test]
async fn test_callbacks_update_handle_info() {
    let store = InMemoryStore::new();
    let controller = controller(&store, RecordingExecutorClient::new());
    let log = JobLogRepository::create(&store, &JobLog::new(1, 1, Utc::now()))
        .await
        .unwrap();

    let callbacks = vec![
        HandleCallbackParam {
            log_id: log.id,
            log_date_time: 0,
            handle_code: 200,
            handle_msg: "done".to_string(),
        },
        HandleCallbackParam {
            log_id: 12345,
            log_date_time: 0,
            handle_code: 500,
            handle_msg: String::new(),
        },
    ];
    let updated = controller.handle_callbacks(&callbacks, Utc::now()).await.unwrap();
    assert_eq!(updated, 1);

    let stored = JobLogRepository::find_by_id(&store, log.id).await.unwrap().unwrap();
    assert_eq!(stored.handle_code, 200);
    assert_eq!(stored.handle_msg, "done");
    assert!(stored.handle_time.is_some());
}
