use async_trait::async_trait;
use scheduler_core::{
    HandleCallbackParam, IdleBeatParam, KillParam, LogParam, RegistryParam, ReturnT,
    SchedulerResult, TriggerParam,
};

/// 调度中心 -> 执行器
///
/// `Err` 只表示网络或编解码失败，业务失败通过 [`ReturnT`] 的 code 表达。
#[async_trait]
pub trait ExecutorClient: Send + Sync {
    async fn beat(&self, address: &str) -> SchedulerResult<ReturnT>;
    async fn idle_beat(&self, address: &str, param: &IdleBeatParam) -> SchedulerResult<ReturnT>;
    async fn run(&self, address: &str, param: &TriggerParam) -> SchedulerResult<ReturnT>;
    async fn kill(&self, address: &str, param: &KillParam) -> SchedulerResult<ReturnT>;
    async fn log(&self, address: &str, param: &LogParam) -> SchedulerResult<ReturnT>;
}

/// 执行器 -> 调度中心
#[async_trait]
pub trait AdminClient: Send + Sync {
    async fn registry(&self, param: &RegistryParam) -> SchedulerResult<ReturnT>;
    async fn registry_remove(&self, param: &RegistryParam) -> SchedulerResult<ReturnT>;
    async fn callback(&self, params: &[HandleCallbackParam]) -> SchedulerResult<ReturnT>;
}
