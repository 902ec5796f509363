//! Metrics collector for the job scheduler
//!
//! 没有安装 recorder 时所有记录都是空操作，测试无需额外准备。

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::debug;

pub struct MetricsCollector {
    trigger_failures_total: Counter,
    scan_duration: Histogram,
    scan_jobs: Histogram,
    wheel_enqueued_total: Counter,
    wheel_fired_total: Counter,
    wheel_rejected_total: Counter,
    live_executors: Gauge,
    handler_execution_duration: Histogram,
    callbacks_total: Counter,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            trigger_failures_total: counter!("scheduler_trigger_failures_total"),
            scan_duration: histogram!("scheduler_scan_duration_seconds"),
            scan_jobs: histogram!("scheduler_scan_jobs"),
            wheel_enqueued_total: counter!("scheduler_time_wheel_enqueued_total"),
            wheel_fired_total: counter!("scheduler_time_wheel_fired_total"),
            wheel_rejected_total: counter!("scheduler_time_wheel_rejected_total"),
            live_executors: gauge!("scheduler_live_executors"),
            handler_execution_duration: histogram!("executor_handler_duration_seconds"),
            callbacks_total: counter!("scheduler_callbacks_total"),
        }
    }

    // Scheduler metrics

    /// 记录一次触发，按触发类型区分
    pub fn record_trigger(&self, trigger_type: &str) {
        counter!("scheduler_triggers_total", "trigger_type" => trigger_type.to_string())
            .increment(1);
    }

    pub fn record_trigger_failure(&self, job_id: i64, reason: &str) {
        self.trigger_failures_total.increment(1);
        debug!(job_id = job_id, reason = reason, "Trigger failed");
    }

    pub fn record_scan(&self, duration_seconds: f64, job_count: usize) {
        self.scan_duration.record(duration_seconds);
        self.scan_jobs.record(job_count as f64);
    }

    pub fn record_wheel_enqueued(&self) {
        self.wheel_enqueued_total.increment(1);
    }

    pub fn record_wheel_fired(&self, count: usize) {
        self.wheel_fired_total.increment(count as u64);
    }

    pub fn record_wheel_rejected(&self) {
        self.wheel_rejected_total.increment(1);
    }

    pub fn update_live_executors(&self, count: usize) {
        self.live_executors.set(count as f64);
    }

    pub fn record_callbacks(&self, count: usize) {
        self.callbacks_total.increment(count as u64);
    }

    // Executor metrics

    pub fn record_handler_execution(&self, handler: &str, success: bool, duration_seconds: f64) {
        self.handler_execution_duration.record(duration_seconds);
        counter!(
            "executor_handler_executions_total",
            "handler" => handler.to_string(),
            "status" => if success { "success" } else { "failed" }
        )
        .increment(1);
    }

    pub fn record_discarded_trigger(&self, job_id: i64) {
        counter!("executor_discarded_triggers_total").increment(1);
        debug!(job_id = job_id, "Trigger discarded by block strategy");
    }
}
