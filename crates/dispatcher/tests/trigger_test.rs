mod common;

use common::{create_trigger, wait_for_logs, RecordingExecutorClient};
use scheduler_core::SUCCESS_CODE;
use scheduler_dispatcher::TriggerRequest;
use scheduler_domain::{
    AddressType, JobGroup, JobGroupRepository, JobInfo, JobInfoRepository, RouteStrategy,
    TriggerType,
};
use scheduler_infrastructure::InMemoryStore;

async fn seed(store: &InMemoryStore, addresses: &[&str], job: JobInfo) -> JobInfo {
    let group = JobGroupRepository::create(
        store,
        &JobGroup::new("demo-app", AddressType::Auto).with_addresses(addresses),
    )
    .await
    .unwrap();
    let mut job = job;
    job.job_group = group.id;
    JobInfoRepository::create(store, &job).await.unwrap()
}

#[tokio::test]
async fn test_trigger_routes_and_records_log() {
    let store = InMemoryStore::new();
    let client = RecordingExecutorClient::new();
    let trigger = create_trigger(&store, client.clone());
    let job = seed(
        &store,
        &["http://a:9999/", "http://b:9999/"],
        JobInfo::new(0, "demoJobHandler")
            .with_param("x=1")
            .with_route_strategy(RouteStrategy::Last),
    )
    .await;

    trigger
        .trigger(TriggerRequest::new(job.id, TriggerType::Manual))
        .await
        .unwrap();

    let runs = client.wait_for_runs(1).await;
    assert_eq!(runs.len(), 1);
    let (address, param) = &runs[0];
    assert_eq!(address, "http://b:9999/");
    assert_eq!(param.executor_handler, "demoJobHandler");
    assert_eq!(param.executor_params, "x=1");
    assert_eq!(param.broadcast_total, 1);

    let logs = wait_for_logs(&store, 1).await;
    assert_eq!(logs[0].id, param.log_id);
    assert_eq!(logs[0].trigger_code, SUCCESS_CODE);
    assert_eq!(logs[0].executor_address, "http://b:9999/");
    assert_eq!(logs[0].executor_sharding_param, "0/1");
}

#[tokio::test]
async fn test_sharding_broadcast_fans_out_to_every_executor() {
    let store = InMemoryStore::new();
    let client = RecordingExecutorClient::new();
    let trigger = create_trigger(&store, client.clone());
    let job = seed(
        &store,
        &["http://a:9999/", "http://b:9999/", "http://c:9999/"],
        JobInfo::new(0, "shardingJobHandler").with_route_strategy(RouteStrategy::ShardingBroadcast),
    )
    .await;

    trigger
        .trigger(TriggerRequest::new(job.id, TriggerType::Cron))
        .await
        .unwrap();

    let mut runs = client.wait_for_runs(3).await;
    assert_eq!(runs.len(), 3);
    runs.sort_by_key(|(_, p)| p.broadcast_index);
    for (index, (address, param)) in runs.iter().enumerate() {
        assert_eq!(param.broadcast_index, index as i32);
        assert_eq!(param.broadcast_total, 3);
        assert_eq!(address, &format!("http://{}:9999/", ["a", "b", "c"][index]));
    }
}

#[tokio::test]
async fn test_missing_job_is_a_no_op() {
    let store = InMemoryStore::new();
    let client = RecordingExecutorClient::new();
    let trigger = create_trigger(&store, client.clone());

    trigger
        .trigger(TriggerRequest::new(404, TriggerType::Manual))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(client.runs().is_empty());
    assert!(store.logs().is_empty());
}

#[tokio::test]
async fn test_empty_address_list_records_failure() {
    let store = InMemoryStore::new();
    let client = RecordingExecutorClient::new();
    let trigger = create_trigger(&store, client.clone());
    let job = seed(&store, &[], JobInfo::new(0, "demoJobHandler")).await;

    trigger
        .trigger(TriggerRequest::new(job.id, TriggerType::Manual))
        .await
        .unwrap();

    let logs = wait_for_logs(&store, 1).await;
    assert_eq!(logs.len(), 1);
    assert_ne!(logs[0].trigger_code, SUCCESS_CODE);
    assert!(logs[0].executor_address.is_empty());
    assert!(client.runs().is_empty());
}

#[tokio::test]
async fn test_failed_trigger_is_retried() {
    let store = InMemoryStore::new();
    let client = RecordingExecutorClient::new();
    client.fail_on("http://a:9999/");
    let trigger = create_trigger(&store, client.clone());
    let mut job = JobInfo::new(0, "demoJobHandler");
    job.executor_fail_retry_count = 2;
    let job = seed(&store, &["http://a:9999/"], job).await;

    trigger
        .trigger(TriggerRequest::new(job.id, TriggerType::Manual))
        .await
        .unwrap();

    let logs = wait_for_logs(&store, 3).await;
    assert_eq!(client.wait_for_runs(3).await.len(), 3);
    let retry_counts: Vec<i32> = logs.iter().map(|l| l.executor_fail_retry_count).collect();
    assert_eq!(retry_counts, vec![2, 1, 0]);
    assert!(logs[1].trigger_msg.contains("RETRY"));
}

#[tokio::test]
async fn test_overrides_param_and_addresses() {
    let store = InMemoryStore::new();
    let client = RecordingExecutorClient::new();
    let trigger = create_trigger(&store, client.clone());
    let job = seed(
        &store,
        &["http://a:9999/"],
        JobInfo::new(0, "demoJobHandler").with_param("default"),
    )
    .await;

    trigger
        .trigger(
            TriggerRequest::new(job.id, TriggerType::Manual)
                .with_executor_param("override")
                .with_address_list("http://manual:9999/"),
        )
        .await
        .unwrap();

    let runs = client.wait_for_runs(1).await;
    assert_eq!(runs[0].0, "http://manual:9999/");
    assert_eq!(runs[0].1.executor_params, "override");
}
