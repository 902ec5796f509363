use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{JobInfo, ScheduleType};

/// CRON表达式解析和调度工具
///
/// 接受 6 段（秒 分 时 日 月 周）或 7 段（带年份）表达式，5 段表达式会自动补齐秒字段。
/// Quartz 风格的 `?` 按 `*` 处理。
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let normalized = normalize_expression(cron_expr);
        let schedule = Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { schedule })
    }

    /// 获取严格晚于 `from` 的下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }
}

fn normalize_expression(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let mut normalized: Vec<String> = fields.iter().map(|f| f.replace('?', "*")).collect();
    if normalized.len() == 5 {
        normalized.insert(0, "0".to_string());
    }
    normalized.join(" ")
}

/// 根据任务的调度类型计算严格晚于 `from_ms` 的下一次触发时间（毫秒）
///
/// `NONE` 类型以及不再有后续触发点的 CRON 返回 `None`。
pub fn next_trigger_time(job: &JobInfo, from_ms: i64) -> SchedulerResult<Option<i64>> {
    match job.schedule_type {
        ScheduleType::None => Ok(None),
        ScheduleType::Cron => {
            let scheduler = CronScheduler::new(&job.schedule_conf)?;
            let from = DateTime::from_timestamp_millis(from_ms).ok_or_else(|| {
                SchedulerError::InvalidScheduleConf(format!("无效的起始时间: {from_ms}"))
            })?;
            let next = scheduler
                .next_execution_time(from)
                .map(|t| t.timestamp_millis());
            debug!("任务 {} CRON 下次触发时间: {:?}", job.id, next);
            Ok(next)
        }
        ScheduleType::FixRate => Ok(Some(from_ms + fix_rate_interval(job)?)),
    }
}

/// 固定频率任务的间隔，`schedule_conf` 以毫秒表示
pub fn fix_rate_interval(job: &JobInfo) -> SchedulerResult<i64> {
    let interval: i64 = job.schedule_conf.trim().parse().map_err(|_| {
        SchedulerError::InvalidScheduleConf(format!(
            "任务 {} 的固定频率配置无效: {}",
            job.id, job.schedule_conf
        ))
    })?;
    if interval <= 0 {
        return Err(SchedulerError::InvalidScheduleConf(format!(
            "任务 {} 的固定频率必须大于0: {}",
            job.id, interval
        )));
    }
    Ok(interval)
}

/// 错过触发后相对 `now_ms` 重新计算下一次触发时间
///
/// CRON 取 `now_ms` 之后的第一个触发点；固定频率沿原有节拍前进，直到越过 `now_ms`。
pub fn next_trigger_time_after_misfire(job: &JobInfo, now_ms: i64) -> SchedulerResult<Option<i64>> {
    match job.schedule_type {
        ScheduleType::FixRate => {
            let interval = fix_rate_interval(job)?;
            let base = job.trigger_next_time;
            if base > now_ms {
                return Ok(Some(base));
            }
            let steps = (now_ms - base) / interval + 1;
            Ok(Some(base + steps * interval))
        }
        _ => next_trigger_time(job, now_ms),
    }
}
