use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use scheduler_core::RegistryParam;
use scheduler_domain::AdminClient;

/// 注册心跳
///
/// 按固定间隔向调度中心注册本执行器地址，退出时注销。
pub struct RegistryHeartbeat {
    admin_client: Arc<dyn AdminClient>,
    registry: RegistryParam,
    interval: Duration,
}

impl RegistryHeartbeat {
    pub fn new(
        admin_client: Arc<dyn AdminClient>,
        app_name: impl Into<String>,
        address: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            admin_client,
            registry: RegistryParam::executor(app_name, address),
            interval,
        }
    }

    pub fn registry(&self) -> &RegistryParam {
        &self.registry
    }

    /// 注册一次，返回调度中心是否接受
    pub async fn beat_once(&self) -> bool {
        match self.admin_client.registry(&self.registry).await {
            Ok(ret) if ret.is_success() => {
                debug!("Registry heartbeat sent: {}", self.registry.registry_value);
                true
            }
            Ok(ret) => {
                warn!("Registry heartbeat rejected: {}", ret.message());
                false
            }
            Err(e) => {
                warn!("Registry heartbeat failed: {}", e);
                false
            }
        }
    }

    pub async fn remove(&self) {
        match self.admin_client.registry_remove(&self.registry).await {
            Ok(ret) if ret.is_success() => {
                info!("Executor unregistered: {}", self.registry.registry_value)
            }
            Ok(ret) => warn!("Executor unregister rejected: {}", ret.message()),
            Err(e) => warn!("Executor unregister failed: {}", e),
        }
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Starting registry heartbeat: app={}, address={}, interval={:?}",
            self.registry.registry_key, self.registry.registry_value, self.interval
        );
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.beat_once().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Registry heartbeat shutting down");
                    break;
                }
            }
        }
        self.remove().await;
    }
}
