//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，调度中心各组件只依赖这些 trait。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::{RegistryParam, SchedulerResult};

use crate::entities::{AddressType, JobGroup, JobInfo, JobLog, JobRegistry};

/// 任务定义仓储
#[async_trait]
pub trait JobInfoRepository: Send + Sync {
    async fn create(&self, job: &JobInfo) -> SchedulerResult<JobInfo>;
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobInfo>>;
}

/// 执行器分组仓储
#[async_trait]
pub trait JobGroupRepository: Send + Sync {
    async fn create(&self, group: &JobGroup) -> SchedulerResult<JobGroup>;
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobGroup>>;
    async fn find_by_address_type(&self, address_type: AddressType)
        -> SchedulerResult<Vec<JobGroup>>;
    async fn update_address_list(&self, id: i64, address_list: &str) -> SchedulerResult<()>;
}

/// 执行器注册表仓储
#[async_trait]
pub trait JobRegistryRepository: Send + Sync {
    /// 存在则刷新 `update_time`，否则插入
    async fn upsert(&self, param: &RegistryParam, now: DateTime<Utc>) -> SchedulerResult<()>;
    async fn remove(&self, param: &RegistryParam) -> SchedulerResult<u64>;
    /// `update_time` 早于 `now - timeout_seconds` 的记录
    async fn find_dead(&self, timeout_seconds: i64, now: DateTime<Utc>)
        -> SchedulerResult<Vec<JobRegistry>>;
    /// `update_time` 在 `now - timeout_seconds` 之后的记录
    async fn find_alive(&self, timeout_seconds: i64, now: DateTime<Utc>)
        -> SchedulerResult<Vec<JobRegistry>>;
    async fn delete_by_id(&self, id: i64) -> SchedulerResult<()>;
}

/// 调度日志仓储
#[async_trait]
pub trait JobLogRepository: Send + Sync {
    async fn create(&self, log: &JobLog) -> SchedulerResult<JobLog>;
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobLog>>;
    /// 记录调度结果：执行器地址、参数、分片与调度码
    async fn update_trigger_info(&self, log: &JobLog) -> SchedulerResult<()>;
    /// 记录执行结果，日志不存在时返回 `false`
    async fn update_handle_info(
        &self,
        log_id: i64,
        handle_code: i32,
        handle_msg: &str,
        handle_time: DateTime<Utc>,
    ) -> SchedulerResult<bool>;
}

/// 跨实例互斥的调度锁
///
/// 持有期间其他调度中心实例无法进入扫描阶段，锁随事务提交或丢弃释放。
#[async_trait]
pub trait ScheduleLockManager: Send + Sync {
    async fn acquire(&self) -> SchedulerResult<Box<dyn ScheduleLockGuard>>;
}

/// 持锁期间的读写操作
///
/// `trigger_status` / `trigger_last_time` / `trigger_next_time` 只能经由持锁的守卫写入。
#[async_trait]
pub trait ScheduleLockGuard: Send {
    /// 运行中且 `trigger_next_time < max_next_time` 的任务，按 id 升序
    async fn find_schedulable(&mut self, max_next_time: i64) -> SchedulerResult<Vec<JobInfo>>;
    async fn find_job(&mut self, id: i64) -> SchedulerResult<Option<JobInfo>>;
    /// 更新 `trigger_status` / `trigger_last_time` / `trigger_next_time`
    async fn update_trigger_time(&mut self, job: &JobInfo) -> SchedulerResult<()>;
    /// 提交并释放锁；未提交直接丢弃时回滚
    async fn commit(self: Box<Self>) -> SchedulerResult<()>;
}
