use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use scheduler_core::{
    IdleBeatParam, KillParam, LogParam, LogResult, ReturnT, SchedulerError, TriggerParam,
};

use crate::runtime::JobRuntime;

/// 执行器对调度中心暴露的五个操作
///
/// 所有结果都以 [`ReturnT`] 表达，业务错误不会变成 HTTP 错误。
#[derive(Clone)]
pub struct ExecutorBiz {
    runtime: Arc<JobRuntime>,
}

impl ExecutorBiz {
    pub fn new(runtime: Arc<JobRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<JobRuntime> {
        &self.runtime
    }

    pub fn beat(&self) -> ReturnT {
        ReturnT::success()
    }

    pub async fn idle_beat(&self, param: IdleBeatParam) -> ReturnT {
        match self.runtime.idle_beat(param.job_id).await {
            Ok(()) => ReturnT::success(),
            Err(e) => ReturnT::fail(e.to_string()),
        }
    }

    pub async fn run(&self, param: TriggerParam) -> ReturnT {
        let job_id = param.job_id;
        let log_id = param.log_id;
        match self.runtime.run(param).await {
            Ok(()) => {
                debug!("Accepted trigger: job_id={}, log_id={}", job_id, log_id);
                ReturnT::success()
            }
            Err(e) => {
                if !matches!(e, SchedulerError::ExecutorBusy(_)) {
                    warn!("Rejected trigger: job_id={}, log_id={}, error={}", job_id, log_id, e);
                }
                ReturnT::fail(e.to_string())
            }
        }
    }

    pub async fn kill(&self, param: KillParam) -> ReturnT {
        if self.runtime.kill(param.job_id).await {
            ReturnT::success()
        } else {
            ReturnT::success_with(json!("job thread already killed."))
        }
    }

    /// 执行器不保存执行日志，返回空的已结束结果
    pub fn log(&self, param: LogParam) -> ReturnT {
        let result = LogResult {
            from_line_num: param.from_line_num,
            to_line_num: param.from_line_num,
            log_content: String::new(),
            is_end: true,
        };
        match serde_json::to_value(result) {
            Ok(content) => ReturnT::success_with(content),
            Err(e) => ReturnT::fail(e.to_string()),
        }
    }
}
