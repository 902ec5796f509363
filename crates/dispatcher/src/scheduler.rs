//! 调度扫描循环
//!
//! 每轮在分布式调度锁内读取 `trigger_next_time` 落在预读窗口内的任务：
//! 已错过太久的按过期策略处理，已到期的立即触发，未到期的放入时间轮，
//! 最后推进下次触发时间并随锁一起提交。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use scheduler_core::{AdminConfig, SchedulerError, SchedulerResult};
use scheduler_domain::{JobInfo, MisfireStrategy, ScheduleLockManager, TriggerType};
use scheduler_infrastructure::MetricsCollector;

use crate::cron_utils::{next_trigger_time, next_trigger_time_after_misfire};
use crate::time_wheel::TimeWheel;
use crate::trigger::{JobTrigger, TriggerCommand, TriggerRequest};

/// 扫描参数，单位毫秒
#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    pub pre_read_ms: i64,
    pub misfire_threshold_ms: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            pre_read_ms: 5000,
            misfire_threshold_ms: 5000,
        }
    }
}

impl From<&AdminConfig> for ScheduleConfig {
    fn from(config: &AdminConfig) -> Self {
        Self {
            pre_read_ms: config.pre_read_ms,
            misfire_threshold_ms: config.misfire_threshold_ms,
        }
    }
}

pub struct JobScheduler {
    lock_manager: Arc<dyn ScheduleLockManager>,
    trigger: JobTrigger,
    time_wheel: Arc<TimeWheel<TriggerCommand>>,
    config: ScheduleConfig,
    metrics: Arc<MetricsCollector>,
}

impl JobScheduler {
    pub fn new(
        lock_manager: Arc<dyn ScheduleLockManager>,
        trigger: JobTrigger,
        time_wheel: Arc<TimeWheel<TriggerCommand>>,
        config: ScheduleConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            lock_manager,
            trigger,
            time_wheel,
            config,
            metrics,
        }
    }

    /// 启动时间轮并运行扫描循环，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "调度扫描循环启动, 预读窗口 {}ms, 过期阈值 {}ms",
            self.config.pre_read_ms, self.config.misfire_threshold_ms
        );
        self.time_wheel.start();

        loop {
            let started = Instant::now();
            let found = match self.scan_once(Utc::now().timestamp_millis()).await {
                Ok(count) => {
                    self.metrics
                        .record_scan(started.elapsed().as_secs_f64(), count);
                    count > 0
                }
                Err(e) if e.is_retryable() => {
                    warn!("调度扫描失败, 下轮重试: {}", e);
                    false
                }
                Err(e) => {
                    error!("调度扫描失败: {}", e);
                    false
                }
            };

            // 有任务时每秒扫描一次，否则等待一个预读窗口，均对齐到整秒
            let base = if found { 1000 } else { self.config.pre_read_ms.max(1000) };
            let offset = i64::from(Utc::now().timestamp_subsec_millis());
            let wait = Duration::from_millis((base - offset).max(1) as u64);

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，停止调度扫描循环");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        self.time_wheel.stop();
    }

    /// 执行一轮扫描，返回本轮处理的任务数
    pub async fn scan_once(&self, now_ms: i64) -> SchedulerResult<usize> {
        let mut guard = self.lock_manager.acquire().await?;
        let jobs = guard
            .find_schedulable(now_ms + self.config.pre_read_ms)
            .await?;
        let count = jobs.len();

        for mut job in jobs {
            if self.process_job(&mut job, now_ms) {
                guard.update_trigger_time(&job).await?;
            }
        }

        guard.commit().await?;
        if count > 0 {
            debug!("本轮调度扫描处理任务 {} 个", count);
        }
        Ok(count)
    }

    /// 处理单个任务，返回是否需要写回触发时间
    fn process_job(&self, job: &mut JobInfo, now_ms: i64) -> bool {
        if now_ms >= job.trigger_next_time + self.config.misfire_threshold_ms {
            warn!(
                "任务 {} 错过调度时间: 计划 {}, 当前 {}",
                job.id, job.trigger_next_time, now_ms
            );
            if job.misfire_strategy == MisfireStrategy::FireOnceNow {
                self.trigger
                    .spawn_trigger(TriggerRequest::new(job.id, TriggerType::Misfire));
            }
            let next = next_trigger_time_after_misfire(job, now_ms);
            apply_next_trigger_time(job, next);
            return true;
        }

        if now_ms >= job.trigger_next_time {
            self.trigger
                .spawn_trigger(TriggerRequest::new(job.id, TriggerType::Cron));
            advance(job);

            if job.is_running()
                && job.trigger_next_time < now_ms + self.config.pre_read_ms
                && self.push_to_wheel(job)
            {
                advance(job);
            }
            return true;
        }

        if self.push_to_wheel(job) {
            advance(job);
            true
        } else {
            false
        }
    }

    fn push_to_wheel(&self, job: &JobInfo) -> bool {
        let command = TriggerCommand::new(job.id, TriggerType::Cron);
        match self.time_wheel.add_task(command, job.trigger_next_time) {
            Ok(()) => {
                self.metrics.record_wheel_enqueued();
                true
            }
            Err(e @ SchedulerError::TimeWheelCapacityExceeded { .. }) => {
                self.metrics.record_wheel_rejected();
                warn!("任务 {} 暂不入轮, 下轮扫描重试: {}", job.id, e);
                false
            }
            Err(e) => {
                error!("任务 {} 加入时间轮失败: {}", job.id, e);
                false
            }
        }
    }
}

/// 以当前计划时间为起点推进下次触发时间
fn advance(job: &mut JobInfo) {
    let next = next_trigger_time(job, job.trigger_next_time);
    apply_next_trigger_time(job, next);
}

fn apply_next_trigger_time(job: &mut JobInfo, next: SchedulerResult<Option<i64>>) {
    match next {
        Ok(Some(next)) => {
            job.trigger_last_time = job.trigger_next_time;
            job.trigger_next_time = next;
        }
        Ok(None) => {
            info!("任务 {} 没有后续触发时间, 停止调度", job.id);
            job.stop();
        }
        Err(e) => {
            error!("任务 {} 计算下次触发时间失败, 停止调度: {}", job.id, e);
            job.stop();
        }
    }
}
