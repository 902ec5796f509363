#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use scheduler_core::{
    HandleCallbackParam, RegistryParam, ReturnT, SchedulerError, SchedulerResult,
};
use scheduler_domain::AdminClient;
use scheduler_infrastructure::MetricsCollector;
use scheduler_worker::{HandlerRegistry, JobContext, JobHandler, JobRuntime};

/// 记录执行器对调度中心的全部调用
#[derive(Default)]
pub struct RecordingAdminClient {
    pub registered: Mutex<Vec<RegistryParam>>,
    pub removed: Mutex<Vec<RegistryParam>>,
    pub callbacks: Mutex<Vec<Vec<HandleCallbackParam>>>,
    /// 前 N 次回调返回失败
    pub fail_callbacks: Mutex<usize>,
}

impl RecordingAdminClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn callback_log_ids(&self) -> Vec<i64> {
        self.callbacks
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|c| c.log_id)
            .collect()
    }
}

#[async_trait]
impl AdminClient for RecordingAdminClient {
    async fn registry(&self, param: &RegistryParam) -> SchedulerResult<ReturnT> {
        self.registered.lock().unwrap().push(param.clone());
        Ok(ReturnT::success())
    }

    async fn registry_remove(&self, param: &RegistryParam) -> SchedulerResult<ReturnT> {
        self.removed.lock().unwrap().push(param.clone());
        Ok(ReturnT::success())
    }

    async fn callback(&self, params: &[HandleCallbackParam]) -> SchedulerResult<ReturnT> {
        {
            let mut failures = self.fail_callbacks.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(SchedulerError::network_error("connection refused"));
            }
        }
        self.callbacks.lock().unwrap().push(params.to_vec());
        Ok(ReturnT::success())
    }
}

/// 执行 `delay_ms` 后返回参数，收到取消后立即失败
pub struct SleepHandler {
    pub delay_ms: u64,
}

#[async_trait]
impl JobHandler for SleepHandler {
    async fn execute(&self, ctx: JobContext) -> SchedulerResult<String> {
        tokio::select! {
            _ = ctx.cancelled() => Err(SchedulerError::TaskExecution("cancelled".into())),
            _ = tokio::time::sleep(Duration::from_millis(self.delay_ms)) => Ok(ctx.param),
        }
    }
}

pub fn create_runtime(
    delay_ms: u64,
) -> (Arc<JobRuntime>, mpsc::UnboundedReceiver<HandleCallbackParam>) {
    let handlers = Arc::new(HandlerRegistry::new());
    handlers
        .register("sleepHandler", Arc::new(SleepHandler { delay_ms }))
        .unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let runtime = Arc::new(JobRuntime::new(handlers, tx, Arc::new(MetricsCollector::new())));
    (runtime, rx)
}

pub fn trigger_body(job_id: i64, log_id: i64, param: &str) -> serde_json::Value {
    serde_json::json!({
        "jobId": job_id,
        "executorHandler": "sleepHandler",
        "executorParams": param,
        "executorBlockStrategy": "SERIAL_EXECUTION",
        "executorTimeout": 0,
        "logId": log_id,
        "logDateTime": 1_700_000_000,
        "glueType": "BEAN",
        "glueSource": "",
        "glueUpdateTime": 0,
        "broadcastIndex": 0,
        "broadcastTotal": 1
    })
}
