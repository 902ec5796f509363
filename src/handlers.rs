//! 示例执行器使用的任务处理器

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_worker::{
    CommandJobHandler, DemoJobHandler, ExecutorServiceBuilder, HttpJobHandler, JobContext,
    JobHandler,
};

/// 按参数中的秒数休眠，期间响应终止
pub struct SleepJobHandler;

#[async_trait]
impl JobHandler for SleepJobHandler {
    async fn execute(&self, ctx: JobContext) -> SchedulerResult<String> {
        let seconds: u64 = ctx.param.trim().parse().unwrap_or(1);
        for elapsed in 0..seconds {
            if ctx.is_cancelled() {
                return Err(SchedulerError::TaskExecution(format!(
                    "休眠在第 {elapsed} 秒被终止"
                )));
            }
            tokio::select! {
                _ = ctx.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }
        if ctx.is_cancelled() {
            return Err(SchedulerError::TaskExecution("休眠被终止".to_string()));
        }
        info!("sleep job finished: job_id={}, seconds={}", ctx.job_id, seconds);
        Ok(format!("休眠 {seconds} 秒完成"))
    }
}

/// 注册内置处理器
pub fn register_builtin_handlers(
    builder: ExecutorServiceBuilder,
) -> SchedulerResult<ExecutorServiceBuilder> {
    builder
        .handler("demoJobHandler", Arc::new(DemoJobHandler))?
        .handler("shardingJobHandler", Arc::new(DemoJobHandler))?
        .handler("commandJobHandler", Arc::new(CommandJobHandler::new()))?
        .handler("httpJobHandler", Arc::new(HttpJobHandler::new()))?
        .handler("sleepJobHandler", Arc::new(SleepJobHandler))
}
