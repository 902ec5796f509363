use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use scheduler_core::{
    HandleCallbackParam, RegistryParam, ReturnT, SchedulerError, SchedulerResult,
};
use scheduler_domain::AdminClient;
use scheduler_infrastructure::transport::{endpoint, TransportClient};

/// 执行器调用调度中心的 HTTP 客户端
///
/// 配置了多个调度中心地址时依次尝试，第一个返回成功的调度中心即视为成功。
#[derive(Clone)]
pub struct HttpAdminClient {
    transport: TransportClient,
    admin_addresses: Vec<String>,
}

impl HttpAdminClient {
    pub fn new(
        admin_addresses: Vec<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> SchedulerResult<Self> {
        if admin_addresses.is_empty() {
            return Err(SchedulerError::config_error("调度中心地址不能为空"));
        }
        Ok(Self {
            transport: TransportClient::new(access_token, timeout)?,
            admin_addresses,
        })
    }

    async fn post_any<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> SchedulerResult<ReturnT> {
        let mut last = None;
        for address in &self.admin_addresses {
            let url = endpoint(address, path);
            match self.transport.post(&url, Some(body)).await {
                Ok(ret) if ret.is_success() => {
                    debug!("Admin call succeeded: {}", url);
                    return Ok(ret);
                }
                Ok(ret) => {
                    warn!("Admin call failed: {}, msg={}", url, ret.message());
                    last = Some(Ok(ret));
                }
                Err(e) => {
                    warn!("Admin call error: {}, error={}", url, e);
                    last = Some(Err(e));
                }
            }
        }
        last.unwrap_or_else(|| Err(SchedulerError::config_error("调度中心地址不能为空")))
    }
}

#[async_trait]
impl AdminClient for HttpAdminClient {
    async fn registry(&self, param: &RegistryParam) -> SchedulerResult<ReturnT> {
        self.post_any("api/registry", param).await
    }

    async fn registry_remove(&self, param: &RegistryParam) -> SchedulerResult<ReturnT> {
        self.post_any("api/registryRemove", param).await
    }

    async fn callback(&self, params: &[HandleCallbackParam]) -> SchedulerResult<ReturnT> {
        self.post_any("api/callback", params).await
    }
}
