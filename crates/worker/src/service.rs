use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use scheduler_core::{ExecutorConfig, SchedulerError, SchedulerResult};
use scheduler_domain::AdminClient;
use scheduler_infrastructure::MetricsCollector;

use crate::components::{CallbackReporter, HttpAdminClient, RegistryHeartbeat};
use crate::executor_biz::ExecutorBiz;
use crate::handler::{HandlerRegistry, JobHandler};
use crate::runtime::JobRuntime;
use crate::server::{create_router, ServerState};

/// 关闭时等待剩余回调上报的最长时间
const CALLBACK_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// 执行器服务构建器
pub struct ExecutorServiceBuilder {
    config: ExecutorConfig,
    handlers: Arc<HandlerRegistry>,
    admin_client: Option<Arc<dyn AdminClient>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ExecutorServiceBuilder {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            handlers: Arc::new(HandlerRegistry::new()),
            admin_client: None,
            metrics: None,
        }
    }

    /// 注册任务处理器
    pub fn handler(self, name: &str, handler: Arc<dyn JobHandler>) -> SchedulerResult<Self> {
        self.handlers.register(name, handler)?;
        Ok(self)
    }

    pub fn admin_client(mut self, admin_client: Arc<dyn AdminClient>) -> Self {
        self.admin_client = Some(admin_client);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> SchedulerResult<ExecutorService> {
        let admin_client = match self.admin_client {
            Some(client) => client,
            None => Arc::new(HttpAdminClient::new(
                self.config.admin_addresses.clone(),
                self.config.access_token.clone(),
                Duration::from_secs(self.config.request_timeout_seconds),
            )?),
        };
        Ok(ExecutorService {
            config: self.config,
            handlers: self.handlers,
            admin_client,
            metrics: self.metrics.unwrap_or_default(),
        })
    }
}

/// 执行器服务
///
/// 监听调度中心的调用，同时运行注册心跳与回调上报。
pub struct ExecutorService {
    config: ExecutorConfig,
    handlers: Arc<HandlerRegistry>,
    admin_client: Arc<dyn AdminClient>,
    metrics: Arc<MetricsCollector>,
}

impl ExecutorService {
    pub fn builder(config: ExecutorConfig) -> ExecutorServiceBuilder {
        ExecutorServiceBuilder::new(config)
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    /// 绑定配置中的地址并运行到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> SchedulerResult<()> {
        let listener = TcpListener::bind(&self.config.bind_address)
            .await
            .map_err(|e| {
                SchedulerError::network_error(format!(
                    "绑定执行器地址 {} 失败: {e}",
                    self.config.bind_address
                ))
            })?;
        self.serve(listener, shutdown_rx).await
    }

    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> SchedulerResult<()> {
        let local_addr: SocketAddr = listener
            .local_addr()
            .map_err(|e| SchedulerError::network_error(format!("读取监听地址失败: {e}")))?;
        let address = self.config.registry_address_for_port(local_addr.port());
        info!(
            "Executor {} listening on {}, registry address {}, handlers {:?}",
            self.config.app_name,
            local_addr,
            address,
            self.handlers.names()
        );

        let (callback_tx, callback_rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(JobRuntime::new(
            Arc::clone(&self.handlers),
            callback_tx,
            Arc::clone(&self.metrics),
        ));

        let heartbeat = RegistryHeartbeat::new(
            Arc::clone(&self.admin_client),
            self.config.app_name.clone(),
            address,
            Duration::from_secs(self.config.heartbeat_interval_seconds),
        );
        let heartbeat_rx = shutdown_rx.resubscribe();
        let heartbeat_handle = tokio::spawn(async move { heartbeat.run(heartbeat_rx).await });

        let reporter = CallbackReporter::new(
            Arc::clone(&self.admin_client),
            Duration::from_secs(self.config.callback_interval_seconds),
        );
        let (reporter_stop_tx, reporter_stop_rx) = broadcast::channel(1);
        let mut reporter_handle =
            tokio::spawn(async move { reporter.run(callback_rx, reporter_stop_rx).await });

        let router = create_router(ServerState::new(
            ExecutorBiz::new(Arc::clone(&runtime)),
            self.config.access_token.clone(),
        ));
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await;

        info!("Executor server stopped, shutting down runtime");
        runtime.shutdown().await;
        drop(runtime);

        if let Err(e) = heartbeat_handle.await {
            warn!("Registry heartbeat task failed: {}", e);
        }

        // 所有分发循环退出后回调通道关闭，上报任务随之结束
        if tokio::time::timeout(CALLBACK_DRAIN_TIMEOUT, &mut reporter_handle)
            .await
            .is_err()
        {
            warn!("Timed out waiting for pending callbacks");
            let _ = reporter_stop_tx.send(());
            let _ = reporter_handle.await;
        }

        served.map_err(|e| SchedulerError::network_error(format!("执行器服务异常退出: {e}")))
    }
}
