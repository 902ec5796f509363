use std::time::Duration;

use async_trait::async_trait;
use scheduler_core::{
    IdleBeatParam, KillParam, LogParam, ReturnT, SchedulerResult, TriggerParam,
};
use scheduler_domain::ExecutorClient;
use tracing::{debug, instrument};

use super::{endpoint, TransportClient};

/// 调度中心调用执行器的 HTTP 客户端
#[derive(Clone)]
pub struct HttpExecutorClient {
    transport: TransportClient,
}

impl HttpExecutorClient {
    pub fn new(access_token: impl Into<String>, timeout: Duration) -> SchedulerResult<Self> {
        Ok(Self {
            transport: TransportClient::new(access_token, timeout)?,
        })
    }
}

#[async_trait]
impl ExecutorClient for HttpExecutorClient {
    async fn beat(&self, address: &str) -> SchedulerResult<ReturnT> {
        self.transport
            .post::<()>(&endpoint(address, "beat"), None)
            .await
    }

    async fn idle_beat(&self, address: &str, param: &IdleBeatParam) -> SchedulerResult<ReturnT> {
        self.transport
            .post(&endpoint(address, "idleBeat"), Some(param))
            .await
    }

    #[instrument(skip(self, param), fields(job_id = param.job_id, log_id = param.log_id))]
    async fn run(&self, address: &str, param: &TriggerParam) -> SchedulerResult<ReturnT> {
        let result = self
            .transport
            .post(&endpoint(address, "run"), Some(param))
            .await?;
        debug!("执行器 {} 返回: code={}", address, result.code);
        Ok(result)
    }

    async fn kill(&self, address: &str, param: &KillParam) -> SchedulerResult<ReturnT> {
        self.transport
            .post(&endpoint(address, "kill"), Some(param))
            .await
    }

    async fn log(&self, address: &str, param: &LogParam) -> SchedulerResult<ReturnT> {
        self.transport
            .post(&endpoint(address, "log"), Some(param))
            .await
    }
}
