#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scheduler_core::{IdleBeatParam, KillParam, LogParam, ReturnT, SchedulerResult, TriggerParam};
use scheduler_dispatcher::JobTrigger;
use scheduler_domain::ExecutorClient;
use scheduler_infrastructure::{InMemoryStore, MetricsCollector};

/// 记录 `/run` 调用的执行器桩
#[derive(Default)]
pub struct RecordingExecutorClient {
    runs: Mutex<Vec<(String, TriggerParam)>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingExecutorClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 指定地址的 `/run` 返回失败
    pub fn fail_on(&self, address: &str) {
        self.failing.lock().unwrap().push(address.to_string());
    }

    pub fn runs(&self) -> Vec<(String, TriggerParam)> {
        self.runs.lock().unwrap().clone()
    }

    /// 等待至少 `count` 次 `/run` 调用
    pub async fn wait_for_runs(&self, count: usize) -> Vec<(String, TriggerParam)> {
        for _ in 0..100 {
            if self.runs.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.runs()
    }
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
        if self.failing.lock().unwrap().iter().any(|a| a == address) {
            return Ok(ReturnT::fail("handler failed"));
        }
        Ok(ReturnT::success())
    }

    async fn kill(&self, _address: &str, _param: &KillParam) -> SchedulerResult<ReturnT> {
        Ok(ReturnT::success())
    }

    async fn log(&self, _address: &str, _param: &LogParam) -> SchedulerResult<ReturnT> {
        Ok(ReturnT::success())
    }
}

pub fn create_test_metrics() -> Arc<MetricsCollector> {
    Arc::new(MetricsCollector::new())
}

pub fn create_trigger(store: &InMemoryStore, client: Arc<RecordingExecutorClient>) -> JobTrigger {
    JobTrigger::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        client,
        create_test_metrics(),
    )
}

/// 等待调度日志写入触发结果
pub async fn wait_for_logs(store: &InMemoryStore, count: usize) -> Vec<scheduler_domain::JobLog> {
    for _ in 0..100 {
        let logs: Vec<_> = store
            .logs()
            .into_iter()
            .filter(|l| l.trigger_code != 0)
            .collect();
        if logs.len() >= count {
            return logs;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    store.logs()
}
