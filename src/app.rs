use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use scheduler_api::{create_app, AppState};
use scheduler_core::AppConfig;
use scheduler_dispatcher::{
    JobController, JobScheduler, JobTrigger, RegistryMonitor, RegistryMonitorConfig,
    ScheduleConfig, TimeWheel,
};
use scheduler_infrastructure::{DatabaseManager, HttpExecutorClient, MetricsCollector};
use scheduler_worker::ExecutorService;

use crate::handlers::register_builtin_handlers;
use crate::shutdown::ShutdownManager;

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行调度中心
    Admin,
    /// 仅运行执行器
    Executor,
    /// 按配置运行调度中心与执行器
    All,
}

impl AppMode {
    pub fn parse(mode: &str, config: &AppConfig) -> Result<Self> {
        match mode {
            "admin" => {
                if !config.admin.enabled {
                    return Err(anyhow::anyhow!("调度中心被禁用，请检查配置"));
                }
                Ok(AppMode::Admin)
            }
            "executor" => {
                if !config.executor.enabled {
                    return Err(anyhow::anyhow!("执行器被禁用，请检查配置"));
                }
                Ok(AppMode::Executor)
            }
            "all" => Ok(AppMode::All),
            _ => Err(anyhow::anyhow!("不支持的运行模式: {mode}")),
        }
    }

    fn runs_admin(self, config: &AppConfig) -> bool {
        match self {
            AppMode::Admin => true,
            AppMode::Executor => false,
            AppMode::All => config.admin.enabled,
        }
    }

    fn runs_executor(self, config: &AppConfig) -> bool {
        match self {
            AppMode::Admin => false,
            AppMode::Executor => true,
            AppMode::All => config.executor.enabled,
        }
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    metrics: Arc<MetricsCollector>,
}

impl Application {
    pub fn new(config: AppConfig, mode: AppMode) -> Self {
        info!("初始化应用程序，模式: {:?}", mode);
        Self {
            config,
            mode,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// 启动全部组件并等待它们退出
    pub async fn run(&self, shutdown: &ShutdownManager) -> Result<()> {
        if self.config.observability.metrics_enabled {
            self.install_metrics_exporter()?;
        }

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();
        let mut database = None;

        if self.mode.runs_admin(&self.config) {
            let db = Arc::new(
                DatabaseManager::new(&self.config.database)
                    .await
                    .context("初始化数据库失败")?,
            );
            tasks.extend(self.start_admin(&db, shutdown).await?);
            database = Some(db);
        }

        if self.mode.runs_executor(&self.config) {
            tasks.push(("executor", self.start_executor(shutdown).await?));
        }

        if tasks.is_empty() {
            return Err(anyhow::anyhow!("没有启用任何组件"));
        }

        let (names, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        for (name, result) in names.into_iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                error!("组件 {} 异常退出: {}", name, e);
            }
        }

        if let Some(db) = database {
            db.close().await;
        }
        info!("应用程序已停止");
        Ok(())
    }

    fn install_metrics_exporter(&self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .observability
            .metrics_bind_address
            .parse()
            .context("无效的监控指标监听地址")?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("安装Prometheus指标导出器失败")?;
        info!("Prometheus指标导出器已启动: {}", addr);
        Ok(())
    }

    async fn start_admin(
        &self,
        db: &DatabaseManager,
        shutdown: &ShutdownManager,
    ) -> Result<Vec<(&'static str, JoinHandle<()>)>> {
        let admin = &self.config.admin;
        info!("启动调度中心, 监听 {}", admin.bind_address);

        let executor_client = Arc::new(
            HttpExecutorClient::new(
                admin.access_token.clone(),
                Duration::from_secs(admin.executor_timeout_seconds),
            )
            .context("创建执行器客户端失败")?,
        );
        let trigger = JobTrigger::new(
            db.job_info_repository(),
            db.job_group_repository(),
            db.job_log_repository(),
            executor_client,
            Arc::clone(&self.metrics),
        );
        let time_wheel = Arc::new(
            TimeWheel::new(
                "job-trigger",
                admin.time_wheel_slots,
                Arc::new(trigger.clone()),
            )
            .context("创建时间轮失败")?,
        );

        let scheduler = JobScheduler::new(
            db.schedule_lock_manager(),
            trigger.clone(),
            time_wheel,
            ScheduleConfig::from(admin),
            Arc::clone(&self.metrics),
        );
        let monitor = RegistryMonitor::new(
            db.job_group_repository(),
            db.job_registry_repository(),
            Some(RegistryMonitorConfig::from(admin)),
            Arc::clone(&self.metrics),
        );
        let controller = JobController::new(
            db.schedule_lock_manager(),
            db.job_info_repository(),
            db.job_log_repository(),
            trigger,
            admin.pre_read_ms,
            Arc::clone(&self.metrics),
        );

        let router = create_app(
            AppState {
                registry_repo: db.job_registry_repository(),
                controller: Arc::new(controller),
            },
            &admin.access_token,
        );
        let listener = TcpListener::bind(&admin.bind_address)
            .await
            .with_context(|| format!("绑定调度中心地址失败: {}", admin.bind_address))?;

        let scheduler_rx = shutdown.subscribe().await;
        let monitor_rx = shutdown.subscribe().await;
        let mut api_rx = shutdown.subscribe().await;

        Ok(vec![
            (
                "scheduler",
                tokio::spawn(async move { scheduler.run(scheduler_rx).await }),
            ),
            (
                "registry-monitor",
                tokio::spawn(async move { monitor.run(monitor_rx).await }),
            ),
            (
                "admin-api",
                tokio::spawn(async move {
                    let served = axum::serve(listener, router)
                        .with_graceful_shutdown(async move {
                            let _ = api_rx.recv().await;
                        })
                        .await;
                    if let Err(e) = served {
                        error!("管理接口服务异常退出: {}", e);
                    }
                }),
            ),
        ])
    }

    async fn start_executor(&self, shutdown: &ShutdownManager) -> Result<JoinHandle<()>> {
        let builder = ExecutorService::builder(self.config.executor.clone())
            .metrics(Arc::clone(&self.metrics));
        let service = register_builtin_handlers(builder)
            .context("注册任务处理器失败")?
            .build()
            .context("创建执行器服务失败")?;

        let shutdown_rx = shutdown.subscribe().await;
        Ok(tokio::spawn(async move {
            if let Err(e) = service.run(shutdown_rx).await {
                error!("执行器服务异常退出: {}", e);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        let mut config = AppConfig::default();
        assert_eq!(AppMode::parse("admin", &config).unwrap(), AppMode::Admin);
        assert!(AppMode::parse("executor", &config).is_err());
        assert!(AppMode::parse("worker", &config).is_err());

        config.executor.enabled = true;
        let mode = AppMode::parse("all", &config).unwrap();
        assert!(mode.runs_admin(&config));
        assert!(mode.runs_executor(&config));
    }
}
