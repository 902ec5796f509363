//! 进程内存储
//!
//! 实现全部仓储接口与调度锁，用于 `memory://` 嵌入模式和各 crate 的测试。
//! 调度锁持有期间的写入先缓存在锁守卫中，提交时才生效，丢弃守卫即回滚。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use scheduler_core::{RegistryParam, SchedulerError, SchedulerResult};
use scheduler_domain::{
    AddressType, JobGroup, JobGroupRepository, JobInfo, JobInfoRepository, JobLog,
    JobLogRepository, JobRegistry, JobRegistryRepository, ScheduleLockGuard,
    ScheduleLockManager,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    jobs: BTreeMap<i64, JobInfo>,
    groups: BTreeMap<i64, JobGroup>,
    registries: BTreeMap<i64, JobRegistry>,
    logs: BTreeMap<i64, JobLog>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    schedule_lock: Arc<AsyncMutex<()>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> SchedulerResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| SchedulerError::internal("内存存储锁已中毒"))
    }

    /// 全部调度日志，按 id 升序
    pub fn logs(&self) -> Vec<JobLog> {
        self.state()
            .map(|s| s.logs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 全部注册记录，按 id 升序
    pub fn registries(&self) -> Vec<JobRegistry> {
        self.state()
            .map(|s| s.registries.values().cloned().collect())
            .unwrap_or_default()
    }

    fn write_trigger_time(&self, job: &JobInfo) -> SchedulerResult<()> {
        let mut state = self.state()?;
        let stored = state
            .jobs
            .get_mut(&job.id)
            .ok_or(SchedulerError::JobNotFound { id: job.id })?;
        stored.trigger_status = job.trigger_status;
        stored.trigger_last_time = job.trigger_last_time;
        stored.trigger_next_time = job.trigger_next_time;
        Ok(())
    }
}

#[async_trait]
impl JobInfoRepository for InMemoryStore {
    async fn create(&self, job: &JobInfo) -> SchedulerResult<JobInfo> {
        let mut state = self.state()?;
        let mut created = job.clone();
        created.id = state.allocate_id();
        state.jobs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobInfo>> {
        Ok(self.state()?.jobs.get(&id).cloned())
    }
}

#[async_trait]
impl JobGroupRepository for InMemoryStore {
    async fn create(&self, group: &JobGroup) -> SchedulerResult<JobGroup> {
        let mut state = self.state()?;
        let mut created = group.clone();
        created.id = state.allocate_id();
        state.groups.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobGroup>> {
        Ok(self.state()?.groups.get(&id).cloned())
    }

    async fn find_by_address_type(
        &self,
        address_type: AddressType,
    ) -> SchedulerResult<Vec<JobGroup>> {
        Ok(self
            .state()?
            .groups
            .values()
            .filter(|g| g.address_type == address_type)
            .cloned()
            .collect())
    }

    async fn update_address_list(&self, id: i64, address_list: &str) -> SchedulerResult<()> {
        let mut state = self.state()?;
        let group = state
            .groups
            .get_mut(&id)
            .ok_or(SchedulerError::JobGroupNotFound { id })?;
        group.address_list = address_list.to_string();
        Ok(())
    }
}

#[async_trait]
impl JobRegistryRepository for InMemoryStore {
    async fn upsert(&self, param: &RegistryParam, now: DateTime<Utc>) -> SchedulerResult<()> {
        let mut state = self.state()?;
        let existing = state.registries.values_mut().find(|r| {
            r.registry_group == param.registry_group
                && r.registry_key == param.registry_key
                && r.registry_value == param.registry_value
        });

        match existing {
            Some(registry) => registry.update_time = now,
            None => {
                let id = state.allocate_id();
                state.registries.insert(
                    id,
                    JobRegistry {
                        id,
                        registry_group: param.registry_group.clone(),
                        registry_key: param.registry_key.clone(),
                        registry_value: param.registry_value.clone(),
                        update_time: now,
                    },
                );
            }
        }
        Ok(())
    }

    async fn remove(&self, param: &RegistryParam) -> SchedulerResult<u64> {
        let mut state = self.state()?;
        let before = state.registries.len();
        state.registries.retain(|_, r| {
            !(r.registry_group == param.registry_group
                && r.registry_key == param.registry_key
                && r.registry_value == param.registry_value)
        });
        Ok((before - state.registries.len()) as u64)
    }

    async fn find_dead(
        &self,
        timeout_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Vec<JobRegistry>> {
        let threshold = now - Duration::seconds(timeout_seconds);
        Ok(self
            .state()?
            .registries
            .values()
            .filter(|r| r.update_time < threshold)
            .cloned()
            .collect())
    }

    async fn find_alive(
        &self,
        timeout_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Vec<JobRegistry>> {
        let threshold = now - Duration::seconds(timeout_seconds);
        Ok(self
            .state()?
            .registries
            .values()
            .filter(|r| r.update_time >= threshold)
            .cloned()
            .collect())
    }

    async fn delete_by_id(&self, id: i64) -> SchedulerResult<()> {
        self.state()?.registries.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl JobLogRepository for InMemoryStore {
    async fn create(&self, log: &JobLog) -> SchedulerResult<JobLog> {
        let mut state = self.state()?;
        let mut created = log.clone();
        created.id = state.allocate_id();
        state.logs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobLog>> {
        Ok(self.state()?.logs.get(&id).cloned())
    }

    async fn update_trigger_info(&self, log: &JobLog) -> SchedulerResult<()> {
        let mut state = self.state()?;
        let stored = state
            .logs
            .get_mut(&log.id)
            .ok_or(SchedulerError::JobLogNotFound { id: log.id })?;
        stored.executor_address = log.executor_address.clone();
        stored.executor_handler = log.executor_handler.clone();
        stored.executor_param = log.executor_param.clone();
        stored.executor_sharding_param = log.executor_sharding_param.clone();
        stored.executor_fail_retry_count = log.executor_fail_retry_count;
        stored.trigger_code = log.trigger_code;
        stored.trigger_msg = log.trigger_msg.clone();
        Ok(())
    }

    async fn update_handle_info(
        &self,
        log_id: i64,
        handle_code: i32,
        handle_msg: &str,
        handle_time: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let mut state = self.state()?;
        match state.logs.get_mut(&log_id) {
            Some(log) => {
                log.handle_code = handle_code;
                log.handle_msg = handle_msg.to_string();
                log.handle_time = Some(handle_time);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

struct InMemoryScheduleLockGuard {
    store: InMemoryStore,
    pending: Vec<JobInfo>,
    _lock: OwnedMutexGuard<()>,
}

#[async_trait]
impl ScheduleLockManager for InMemoryStore {
    async fn acquire(&self) -> SchedulerResult<Box<dyn ScheduleLockGuard>> {
        let lock = self.schedule_lock.clone().lock_owned().await;
        Ok(Box::new(InMemoryScheduleLockGuard {
            store: self.clone(),
            pending: Vec::new(),
            _lock: lock,
        }))
    }
}

#[async_trait]
impl ScheduleLockGuard for InMemoryScheduleLockGuard {
    async fn find_schedulable(&mut self, max_next_time: i64) -> SchedulerResult<Vec<JobInfo>> {
        Ok(self
            .store
            .state()?
            .jobs
            .values()
            .filter(|j| j.is_running() && j.trigger_next_time < max_next_time)
            .cloned()
            .collect())
    }

    async fn find_job(&mut self, id: i64) -> SchedulerResult<Option<JobInfo>> {
        let Some(mut job) = self.store.state()?.jobs.get(&id).cloned() else {
            return Ok(None);
        };
        // 本守卫尚未提交的写入优先
        if let Some(pending) = self.pending.iter().rev().find(|j| j.id == id) {
            job.trigger_status = pending.trigger_status;
            job.trigger_last_time = pending.trigger_last_time;
            job.trigger_next_time = pending.trigger_next_time;
        }
        Ok(Some(job))
    }

    async fn update_trigger_time(&mut self, job: &JobInfo) -> SchedulerResult<()> {
        if !self.store.state()?.jobs.contains_key(&job.id) {
            return Err(SchedulerError::JobNotFound { id: job.id });
        }
        self.pending.push(job.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> SchedulerResult<()> {
        for job in &self.pending {
            self.store.write_trigger_time(job)?;
        }
        Ok(())
    }
}
