use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use scheduler_core::{AdminConfig, SchedulerResult, REGISTRY_GROUP_EXECUTOR};
use scheduler_domain::{AddressType, JobGroupRepository, JobRegistryRepository};
use scheduler_infrastructure::MetricsCollector;

/// 注册表监控配置
#[derive(Debug, Clone)]
pub struct RegistryMonitorConfig {
    /// 刷新间隔（秒）
    pub interval_seconds: u64,
    /// 注册记录超过该时长未更新视为失效（秒）
    pub dead_timeout_seconds: i64,
}

impl Default for RegistryMonitorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            dead_timeout_seconds: 30,
        }
    }
}

impl From<&AdminConfig> for RegistryMonitorConfig {
    fn from(config: &AdminConfig) -> Self {
        Self {
            interval_seconds: config.registry_monitor_interval_seconds,
            dead_timeout_seconds: config.registry_dead_timeout_seconds,
        }
    }
}

/// 注册表监控
///
/// 周期性清理过期的注册记录，并用存活的执行器地址覆盖自动注册分组的地址列表。
pub struct RegistryMonitor {
    group_repo: Arc<dyn JobGroupRepository>,
    registry_repo: Arc<dyn JobRegistryRepository>,
    config: RegistryMonitorConfig,
    metrics: Arc<MetricsCollector>,
}

impl RegistryMonitor {
    pub fn new(
        group_repo: Arc<dyn JobGroupRepository>,
        registry_repo: Arc<dyn JobRegistryRepository>,
        config: Option<RegistryMonitorConfig>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            group_repo,
            registry_repo,
            config: config.unwrap_or_default(),
            metrics,
        }
    }

    /// 执行一次刷新，返回地址列表发生变化的分组数
    pub async fn refresh_once(&self, now: DateTime<Utc>) -> SchedulerResult<usize> {
        let groups = self.group_repo.find_by_address_type(AddressType::Auto).await?;
        if groups.is_empty() {
            return Ok(0);
        }

        let ttl = self.config.dead_timeout_seconds;
        for dead in self.registry_repo.find_dead(ttl, now).await? {
            debug!(
                "移除失效注册: {} {} {}",
                dead.registry_group, dead.registry_key, dead.registry_value
            );
            // 单条删除，避免大批量删除长时间锁表
            if let Err(e) = self.registry_repo.delete_by_id(dead.id).await {
                warn!("删除失效注册 {} 失败: {}", dead.id, e);
            }
        }

        let alive = self.registry_repo.find_alive(ttl, now).await?;
        let mut app_addresses: HashMap<String, BTreeSet<String>> = HashMap::new();
        for registry in alive
            .into_iter()
            .filter(|r| r.registry_group == REGISTRY_GROUP_EXECUTOR)
        {
            app_addresses
                .entry(registry.registry_key)
                .or_default()
                .insert(registry.registry_value);
        }
        let live_count: usize = app_addresses.values().map(BTreeSet::len).sum();
        self.metrics.update_live_executors(live_count);

        let mut changed = 0;
        for group in groups {
            let address_list = app_addresses
                .get(&group.app_name)
                .map(|set| set.iter().cloned().collect::<Vec<_>>().join(","))
                .unwrap_or_default();

            if address_list != group.address_list {
                info!(
                    "执行器分组 {} 地址更新: [{}] -> [{}]",
                    group.app_name, group.address_list, address_list
                );
                self.group_repo
                    .update_address_list(group.id, &address_list)
                    .await?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// 运行监控循环，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "启动注册表监控, 间隔 {} 秒, 失效阈值 {} 秒",
            self.config.interval_seconds, self.config.dead_timeout_seconds
        );
        let interval = Duration::from_secs(self.config.interval_seconds.max(1));

        loop {
            match self.refresh_once(Utc::now()).await {
                Ok(_) => {}
                Err(e) if e.is_retryable() => warn!("注册表刷新失败, 下轮重试: {}", e),
                Err(e) => error!("注册表刷新失败: {}", e),
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("收到停止信号，退出注册表监控");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}
