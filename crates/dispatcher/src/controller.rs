use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use scheduler_core::{HandleCallbackParam, SchedulerError, SchedulerResult};
use scheduler_domain::{
    JobInfo, JobInfoRepository, JobLogRepository, ScheduleLockGuard, ScheduleLockManager,
    ScheduleType, TriggerStatus, TriggerType,
};
use scheduler_infrastructure::MetricsCollector;

use crate::cron_utils::next_trigger_time;
use crate::trigger::{JobTrigger, TriggerRequest};

/// 任务控制服务
///
/// 供管理接口使用：手动触发、启动、停止任务，以及接收执行结果回调。
/// 启停与调度扫描一样在调度锁内读写触发时间，扫描提交不会覆盖启停结果。
pub struct JobController {
    lock_manager: Arc<dyn ScheduleLockManager>,
    job_repo: Arc<dyn JobInfoRepository>,
    log_repo: Arc<dyn JobLogRepository>,
    trigger: JobTrigger,
    pre_read_ms: i64,
    metrics: Arc<MetricsCollector>,
}

impl JobController {
    pub fn new(
        lock_manager: Arc<dyn ScheduleLockManager>,
        job_repo: Arc<dyn JobInfoRepository>,
        log_repo: Arc<dyn JobLogRepository>,
        trigger: JobTrigger,
        pre_read_ms: i64,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            lock_manager,
            job_repo,
            log_repo,
            trigger,
            pre_read_ms,
            metrics,
        }
    }

    async fn load_job(&self, job_id: i64) -> SchedulerResult<JobInfo> {
        self.job_repo
            .find_by_id(job_id)
            .await?
            .ok_or(SchedulerError::JobNotFound { id: job_id })
    }

    /// 手动触发任务，可覆盖本次的执行参数与执行器地址
    pub async fn trigger_job(
        &self,
        job_id: i64,
        executor_param: Option<String>,
        address_list: Option<String>,
    ) -> SchedulerResult<()> {
        self.load_job(job_id).await?;
        info!("手动触发任务: {}", job_id);

        let mut request = TriggerRequest::new(job_id, TriggerType::Manual);
        request.executor_param = executor_param;
        request.address_list = address_list;
        self.trigger.spawn_trigger(request);
        Ok(())
    }

    async fn load_locked_job(
        guard: &mut dyn ScheduleLockGuard,
        job_id: i64,
    ) -> SchedulerResult<JobInfo> {
        guard
            .find_job(job_id)
            .await?
            .ok_or(SchedulerError::JobNotFound { id: job_id })
    }

    /// 启动调度，下次触发时间从当前时间加预读窗口之后开始计算
    pub async fn start_job(&self, job_id: i64, now: DateTime<Utc>) -> SchedulerResult<JobInfo> {
        let mut guard = self.lock_manager.acquire().await?;
        let mut job = Self::load_locked_job(guard.as_mut(), job_id).await?;
        if job.schedule_type == ScheduleType::None {
            return Err(SchedulerError::InvalidScheduleConf(format!(
                "任务 {job_id} 的调度类型为 NONE, 不能启动"
            )));
        }

        let from = now.timestamp_millis() + self.pre_read_ms;
        let next = next_trigger_time(&job, from)?.ok_or_else(|| {
            SchedulerError::InvalidScheduleConf(format!("任务 {job_id} 没有后续触发时间"))
        })?;

        job.trigger_status = TriggerStatus::Running;
        job.trigger_last_time = 0;
        job.trigger_next_time = next;
        guard.update_trigger_time(&job).await?;
        guard.commit().await?;
        info!("启动任务 {}, 下次触发时间 {}", job_id, next);
        Ok(job)
    }

    pub async fn stop_job(&self, job_id: i64) -> SchedulerResult<JobInfo> {
        let mut guard = self.lock_manager.acquire().await?;
        let mut job = Self::load_locked_job(guard.as_mut(), job_id).await?;
        job.stop();
        guard.update_trigger_time(&job).await?;
        guard.commit().await?;
        info!("停止任务 {}", job_id);
        Ok(job)
    }

    /// 记录执行结果回调，返回成功写入的条数
    ///
    /// 找不到对应日志的回调会被跳过，不影响同批次的其他回调。
    pub async fn handle_callbacks(
        &self,
        callbacks: &[HandleCallbackParam],
        now: DateTime<Utc>,
    ) -> SchedulerResult<usize> {
        let mut updated = 0;
        for callback in callbacks {
            let found = self
                .log_repo
                .update_handle_info(callback.log_id, callback.handle_code, &callback.handle_msg, now)
                .await?;
            if found {
                updated += 1;
                debug!("日志 {} 执行结果: {}", callback.log_id, callback.handle_code);
            } else {
                warn!("回调对应的调度日志不存在: {}", callback.log_id);
            }
        }
        self.metrics.record_callbacks(updated);
        Ok(updated)
    }
}
