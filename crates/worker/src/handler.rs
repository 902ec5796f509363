//! 任务处理器
//!
//! 执行器以名称注册处理器，调度中心下发的 `executorHandler` 按名称匹配。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::info;

use scheduler_core::{SchedulerError, SchedulerResult, TriggerParam};

/// 单次执行的上下文
///
/// 取消是协作式的：任务被终止、被覆盖或超时后 [`JobContext::is_cancelled`] 变为 true，
/// 长时间运行的处理器需要自行检查并尽快返回。
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: i64,
    pub log_id: i64,
    pub log_date_time: i64,
    pub param: String,
    pub shard_index: i32,
    pub shard_total: i32,
    cancel: CancellationToken,
}

impl JobContext {
    pub fn new(param: &TriggerParam, cancel: CancellationToken) -> Self {
        Self {
            job_id: param.job_id,
            log_id: param.log_id,
            log_date_time: param.log_date_time,
            param: param.executor_params.clone(),
            shard_index: param.broadcast_index,
            shard_total: param.broadcast_total,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 等待取消信号
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// 分发循环启动时调用
    async fn init(&self) -> SchedulerResult<()> {
        Ok(())
    }

    /// 执行一次任务，`Ok` 中的内容作为执行结果消息回调给调度中心
    async fn execute(&self, ctx: JobContext) -> SchedulerResult<String>;

    /// 分发循环退出时调用
    async fn destroy(&self) -> SchedulerResult<()> {
        Ok(())
    }
}

/// 处理器注册表
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> SchedulerResult<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SchedulerError::config_error("处理器名称不能为空"));
        }

        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| SchedulerError::internal("处理器注册表锁已中毒"))?;
        if handlers.contains_key(&name) {
            return Err(SchedulerError::config_error(format!("处理器重复注册: {name}")));
        }
        info!("注册任务处理器: {}", name);
        handlers.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers
            .read()
            .ok()
            .and_then(|handlers| handlers.get(name).cloned())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .map(|handlers| handlers.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}
