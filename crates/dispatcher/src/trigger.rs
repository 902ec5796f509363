//! 任务触发
//!
//! 一次触发会创建调度日志、路由到执行器并调用 `/run`。调用在独立协程中完成，
//! 扫描循环和时间轮不会被网络请求阻塞。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use scheduler_core::{ReturnT, SchedulerError, SchedulerResult, TriggerParam};
use scheduler_domain::{
    AddressType, ExecutorClient, JobGroup, JobGroupRepository, JobInfo, JobInfoRepository, JobLog,
    JobLogRepository, RouteStrategy, TriggerType,
};
use scheduler_infrastructure::MetricsCollector;

use crate::router::ExecutorRouter;
use crate::time_wheel::WheelTaskHandler;

/// 时间轮中保存的触发命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerCommand {
    pub job_id: i64,
    pub trigger_type: TriggerType,
    pub sharding_param: Option<String>,
}

impl TriggerCommand {
    pub fn new(job_id: i64, trigger_type: TriggerType) -> Self {
        Self {
            job_id,
            trigger_type,
            sharding_param: None,
        }
    }
}

/// 触发请求
///
/// 未设置的字段沿用任务自身的配置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRequest {
    pub job_id: i64,
    pub trigger_type: TriggerType,
    pub fail_retry_count: Option<i32>,
    pub executor_param: Option<String>,
    /// 逗号分隔的地址列表，设置后本次触发按手动录入的地址路由
    pub address_list: Option<String>,
    /// 分片参数 `index/total`
    pub sharding_param: Option<String>,
}

impl TriggerRequest {
    pub fn new(job_id: i64, trigger_type: TriggerType) -> Self {
        Self {
            job_id,
            trigger_type,
            fail_retry_count: None,
            executor_param: None,
            address_list: None,
            sharding_param: None,
        }
    }

    pub fn with_executor_param(mut self, param: impl Into<String>) -> Self {
        self.executor_param = Some(param.into());
        self
    }

    pub fn with_address_list(mut self, address_list: impl Into<String>) -> Self {
        self.address_list = Some(address_list.into());
        self
    }

    pub fn with_fail_retry_count(mut self, count: i32) -> Self {
        self.fail_retry_count = Some(count);
        self
    }

    pub fn with_sharding_param(mut self, sharding_param: impl Into<String>) -> Self {
        self.sharding_param = Some(sharding_param.into());
        self
    }
}

impl From<TriggerCommand> for TriggerRequest {
    fn from(command: TriggerCommand) -> Self {
        Self {
            sharding_param: command.sharding_param,
            ..Self::new(command.job_id, command.trigger_type)
        }
    }
}

/// 解析 `index/total` 形式的分片参数
pub fn parse_sharding_param(raw: &str) -> Option<(i32, i32)> {
    let (index, total) = raw.trim().split_once('/')?;
    let index: i32 = index.trim().parse().ok()?;
    let total: i32 = total.trim().parse().ok()?;
    (total > 0 && (0..total).contains(&index)).then_some((index, total))
}

#[derive(Clone)]
pub struct JobTrigger {
    job_repo: Arc<dyn JobInfoRepository>,
    group_repo: Arc<dyn JobGroupRepository>,
    log_repo: Arc<dyn JobLogRepository>,
    router: Arc<ExecutorRouter>,
    executor_client: Arc<dyn ExecutorClient>,
    metrics: Arc<MetricsCollector>,
}

impl JobTrigger {
    pub fn new(
        job_repo: Arc<dyn JobInfoRepository>,
        group_repo: Arc<dyn JobGroupRepository>,
        log_repo: Arc<dyn JobLogRepository>,
        executor_client: Arc<dyn ExecutorClient>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let router = Arc::new(ExecutorRouter::new(Arc::clone(&executor_client)));
        Self {
            job_repo,
            group_repo,
            log_repo,
            router,
            executor_client,
            metrics,
        }
    }

    /// 在后台协程中触发，错误只记录日志
    pub fn spawn_trigger(&self, request: TriggerRequest) {
        let trigger = self.clone();
        tokio::spawn(async move {
            let job_id = request.job_id;
            if let Err(e) = trigger.trigger(request).await {
                error!("任务 {} 触发失败: {}", job_id, e);
            }
        });
    }

    /// 触发一次任务
    ///
    /// 任务不存在时直接返回；分片广播任务对每个执行器各发起一次调用。
    /// 对执行器的调用在独立协程中进行，本方法不等待其完成。
    #[instrument(
        skip(self, request),
        fields(job_id = request.job_id, trigger_type = request.trigger_type.as_str())
    )]
    pub async fn trigger(&self, request: TriggerRequest) -> SchedulerResult<()> {
        let Some(mut job) = self.job_repo.find_by_id(request.job_id).await? else {
            warn!("触发失败, 任务不存在: {}", request.job_id);
            return Ok(());
        };

        if let Some(param) = request.executor_param {
            job.executor_param = param;
        }
        let fail_retry_count = request
            .fail_retry_count
            .unwrap_or(job.executor_fail_retry_count)
            .max(0);

        let mut group = self
            .group_repo
            .find_by_id(job.job_group)
            .await?
            .ok_or(SchedulerError::JobGroupNotFound { id: job.job_group })?;
        if let Some(address_list) = request.address_list.filter(|l| !l.trim().is_empty()) {
            group.address_type = AddressType::Manual;
            group.address_list = address_list;
        }

        self.metrics.record_trigger(request.trigger_type.as_str());
        let sharding = request.sharding_param.as_deref().and_then(parse_sharding_param);
        let addresses = group.addresses();

        let job = Arc::new(job);
        let group = Arc::new(group);
        let broadcast = job.executor_route_strategy == RouteStrategy::ShardingBroadcast
            && !addresses.is_empty()
            && sharding.is_none();

        if broadcast {
            let total = addresses.len() as i32;
            info!("任务 {} 分片广播, 执行器数量 {}", job.id, total);
            for index in 0..total {
                self.spawn_process(
                    Arc::clone(&job),
                    Arc::clone(&group),
                    request.trigger_type,
                    fail_retry_count,
                    index,
                    total,
                );
            }
        } else {
            let (index, total) = sharding.unwrap_or((0, 1));
            self.spawn_process(job, group, request.trigger_type, fail_retry_count, index, total);
        }
        Ok(())
    }

    fn spawn_process(
        &self,
        job: Arc<JobInfo>,
        group: Arc<JobGroup>,
        trigger_type: TriggerType,
        fail_retry_count: i32,
        index: i32,
        total: i32,
    ) {
        let trigger = self.clone();
        tokio::spawn(async move {
            trigger
                .process_trigger(&job, &group, trigger_type, fail_retry_count, index, total)
                .await;
        });
    }

    /// 执行一个分片的触发，失败时按剩余重试次数以 RETRY 类型重新触发
    async fn process_trigger(
        &self,
        job: &JobInfo,
        group: &JobGroup,
        trigger_type: TriggerType,
        fail_retry_count: i32,
        index: i32,
        total: i32,
    ) {
        let mut trigger_type = trigger_type;
        let mut remaining = fail_retry_count;
        loop {
            match self.dispatch_once(job, group, trigger_type, remaining, index, total).await {
                Ok(true) => break,
                Ok(false) if remaining > 0 => {
                    remaining -= 1;
                    trigger_type = TriggerType::Retry;
                    info!("任务 {} 调度失败, 剩余重试次数 {}", job.id, remaining);
                }
                Ok(false) => break,
                Err(e) => {
                    error!("任务 {} 调度日志写入失败: {}", job.id, e);
                    break;
                }
            }
        }
    }

    /// 单次调度，返回执行器是否接受
    async fn dispatch_once(
        &self,
        job: &JobInfo,
        group: &JobGroup,
        trigger_type: TriggerType,
        fail_retry_count: i32,
        index: i32,
        total: i32,
    ) -> SchedulerResult<bool> {
        let started = Instant::now();
        let trigger_time = Utc::now();
        let mut log = self
            .log_repo
            .create(&JobLog::new(job.job_group, job.id, trigger_time))
            .await?;

        let param = TriggerParam {
            job_id: job.id,
            executor_handler: job.executor_handler.clone(),
            executor_params: job.executor_param.clone(),
            executor_block_strategy: job.executor_block_strategy.as_str().to_string(),
            executor_timeout: i64::from(job.executor_timeout),
            log_id: log.id,
            log_date_time: trigger_time.timestamp(),
            glue_type: job.glue_type.as_str().to_string(),
            glue_source: job.glue_source.clone(),
            glue_update_time: job.glue_updatetime,
            broadcast_index: index,
            broadcast_total: total,
        };

        let addresses = group.addresses();
        let routed = self
            .router
            .route(job.executor_route_strategy, &param, &addresses)
            .await;

        let result = match &routed {
            Ok(address) => self.run_executor(address, &param).await,
            Err(e) => ReturnT::fail(format!("调度失败: 执行器地址为空或路由失败: {e}")),
        };

        log.executor_address = routed.as_ref().ok().cloned().unwrap_or_default();
        log.executor_handler = job.executor_handler.clone();
        log.executor_param = job.executor_param.clone();
        log.executor_sharding_param = format!("{index}/{total}");
        log.executor_fail_retry_count = fail_retry_count;
        log.trigger_code = result.code;
        log.trigger_msg = format!(
            "触发类型: {}; 注册方式: {}; 路由策略: {}; 执行器地址: {}; 阻塞策略: {}; 超时: {}; 失败重试: {}; 结果: {}",
            trigger_type,
            if group.address_type == AddressType::Auto { "自动注册" } else { "手动录入" },
            job.executor_route_strategy,
            log.executor_address,
            job.executor_block_strategy,
            job.executor_timeout,
            fail_retry_count,
            if result.is_success() { "成功".to_string() } else { result.message() }
        );
        self.log_repo.update_trigger_info(&log).await?;

        if !result.is_success() {
            self.metrics
                .record_trigger_failure(job.id, &result.message());
            warn!("任务 {} 调度失败: {}", job.id, result.message());
        }
        debug!(
            "任务 {} 调度完成, 日志 {}, 耗时 {:?}",
            job.id,
            log.id,
            started.elapsed()
        );
        Ok(result.is_success())
    }

    async fn run_executor(&self, address: &str, param: &TriggerParam) -> ReturnT {
        let _call = self.router.track_call(address);
        match self.executor_client.run(address, param).await {
            Ok(ret) => ret,
            Err(e) => ReturnT::fail(format!("调用执行器 {address} 失败: {e}")),
        }
    }
}

#[async_trait]
impl WheelTaskHandler<TriggerCommand> for JobTrigger {
    async fn fire(&self, task: TriggerCommand) {
        let job_id = task.job_id;
        self.metrics.record_wheel_fired(1);
        if let Err(e) = self.trigger(task.into()).await {
            error!("时间轮触发任务 {} 失败: {}", job_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sharding_param() {
        assert_eq!(parse_sharding_param("1/3"), Some((1, 3)));
        assert_eq!(parse_sharding_param(" 0 / 1 "), Some((0, 1)));
        assert_eq!(parse_sharding_param("3/3"), None);
        assert_eq!(parse_sharding_param("1/0"), None);
        assert_eq!(parse_sharding_param("abc"), None);
    }

    #[test]
    fn test_request_from_command() {
        let command = TriggerCommand {
            job_id: 5,
            trigger_type: TriggerType::Cron,
            sharding_param: Some("0/2".to_string()),
        };
        let request = TriggerRequest::from(command);
        assert_eq!(request.job_id, 5);
        assert_eq!(request.trigger_type, TriggerType::Cron);
        assert_eq!(request.sharding_param.as_deref(), Some("0/2"));
        assert!(request.executor_param.is_none());
    }
}
