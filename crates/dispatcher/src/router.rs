//! 执行器路由
//!
//! 每次触发从执行器地址列表中选出一个地址。FIRST/LAST/CONSISTENT_HASH/SHARDING_BROADCAST
//! 只依赖输入；ROUND/LFU/LRU 按任务保存状态；FAILOVER/BUSYOVER 需要探测执行器。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use scheduler_core::{IdleBeatParam, SchedulerError, SchedulerResult, TriggerParam};
use scheduler_domain::{ExecutorClient, RouteStrategy};

const VIRTUAL_NODE_COUNT: usize = 100;

/// ROUND/LFU/LRU 的按任务状态每隔这么久整体清空一次，已删除任务的状态不会一直保留
const JOB_STATE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct RouterState {
    round_counters: HashMap<i64, usize>,
    use_counts: HashMap<i64, HashMap<String, u64>>,
    last_used: HashMap<i64, HashMap<String, u64>>,
    job_state_since: Instant,
    /// 只保存计数大于 0 的地址
    outstanding: HashMap<String, usize>,
}

impl RouterState {
    fn new(now: Instant) -> Self {
        Self {
            round_counters: HashMap::new(),
            use_counts: HashMap::new(),
            last_used: HashMap::new(),
            job_state_since: now,
            outstanding: HashMap::new(),
        }
    }

    fn expire_job_state(&mut self, now: Instant) {
        if now.saturating_duration_since(self.job_state_since) < JOB_STATE_TTL {
            return;
        }
        debug!(
            "清空路由状态, 涉及任务 {} 个",
            self.round_counters.len().max(self.use_counts.len()).max(self.last_used.len())
        );
        self.round_counters.clear();
        self.use_counts.clear();
        self.last_used.clear();
        self.job_state_since = now;
    }
}

pub struct ExecutorRouter {
    executor_client: Arc<dyn ExecutorClient>,
    state: Mutex<RouterState>,
    sequence: AtomicU64,
}

impl ExecutorRouter {
    pub fn new(executor_client: Arc<dyn ExecutorClient>) -> Self {
        Self {
            executor_client,
            state: Mutex::new(RouterState::new(Instant::now())),
            sequence: AtomicU64::new(0),
        }
    }

    fn state(&self) -> SchedulerResult<MutexGuard<'_, RouterState>> {
        self.state
            .lock()
            .map_err(|_| SchedulerError::internal("路由状态锁已中毒"))
    }

    fn job_state(&self) -> SchedulerResult<MutexGuard<'_, RouterState>> {
        let mut state = self.state()?;
        state.expire_job_state(Instant::now());
        Ok(state)
    }

    /// 按策略选择执行器地址，地址列表为空时失败
    pub async fn route(
        &self,
        strategy: RouteStrategy,
        param: &TriggerParam,
        addresses: &[String],
    ) -> SchedulerResult<String> {
        if addresses.is_empty() {
            return Err(SchedulerError::NoAvailableExecutor);
        }

        let job_id = param.job_id;
        let address = match strategy {
            RouteStrategy::First => addresses[0].clone(),
            RouteStrategy::Last => addresses[addresses.len() - 1].clone(),
            RouteStrategy::Round => self.route_round(job_id, addresses)?,
            RouteStrategy::Random => {
                let index = rand::rng().random_range(0..addresses.len());
                addresses[index].clone()
            }
            RouteStrategy::ConsistentHash => consistent_hash(job_id, addresses),
            RouteStrategy::LeastFrequentlyUsed => self.route_lfu(job_id, addresses)?,
            RouteStrategy::LeastRecentlyUsed => self.route_lru(job_id, addresses)?,
            RouteStrategy::Failover => self.route_failover(addresses).await?,
            RouteStrategy::BusyOver => self.route_busyover(job_id, addresses).await?,
            RouteStrategy::ShardingBroadcast => addresses
                .get(usize::try_from(param.broadcast_index).unwrap_or(0))
                .unwrap_or(&addresses[0])
                .clone(),
        };

        debug!("任务 {} 路由策略 {} 选择执行器 {}", job_id, strategy, address);
        Ok(address)
    }

    fn route_round(&self, job_id: i64, addresses: &[String]) -> SchedulerResult<String> {
        let mut state = self.job_state()?;
        let counter = state.round_counters.entry(job_id).or_insert(0);
        let index = *counter % addresses.len();
        *counter = counter.wrapping_add(1);
        Ok(addresses[index].clone())
    }

    fn route_lfu(&self, job_id: i64, addresses: &[String]) -> SchedulerResult<String> {
        let mut state = self.job_state()?;
        let counts = state.use_counts.entry(job_id).or_default();
        counts.retain(|address, _| addresses.contains(address));

        let mut chosen = &addresses[0];
        let mut lowest = u64::MAX;
        for address in addresses {
            let count = counts.get(address).copied().unwrap_or(0);
            if count < lowest {
                lowest = count;
                chosen = address;
            }
        }
        *counts.entry(chosen.clone()).or_insert(0) += 1;
        Ok(chosen.clone())
    }

    fn route_lru(&self, job_id: i64, addresses: &[String]) -> SchedulerResult<String> {
        let stamp = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = self.job_state()?;
        let used = state.last_used.entry(job_id).or_default();
        used.retain(|address, _| addresses.contains(address));

        let mut chosen = &addresses[0];
        let mut oldest = u64::MAX;
        for address in addresses {
            let last = used.get(address).copied().unwrap_or(0);
            if last < oldest {
                oldest = last;
                chosen = address;
            }
        }
        used.insert(chosen.clone(), stamp);
        Ok(chosen.clone())
    }

    async fn route_failover(&self, addresses: &[String]) -> SchedulerResult<String> {
        for address in addresses {
            match self.executor_client.beat(address).await {
                Ok(ret) if ret.is_success() => return Ok(address.clone()),
                Ok(ret) => warn!("故障转移: 执行器 {} 心跳失败: {}", address, ret.message()),
                Err(e) => warn!("故障转移: 执行器 {} 心跳异常: {}", address, e),
            }
        }
        Err(SchedulerError::network_error("故障转移: 所有执行器心跳均失败"))
    }

    async fn route_busyover(&self, job_id: i64, addresses: &[String]) -> SchedulerResult<String> {
        let param = IdleBeatParam { job_id };
        for address in addresses {
            match self.executor_client.idle_beat(address, &param).await {
                Ok(ret) if ret.is_success() => return Ok(address.clone()),
                Ok(ret) => debug!("忙碌转移: 执行器 {} 忙碌: {}", address, ret.message()),
                Err(e) => debug!("忙碌转移: 执行器 {} 空闲检测异常: {}", address, e),
            }
        }

        // 全部忙碌时退回到在途调用最少的执行器
        let state = self.state()?;
        let least_loaded = addresses
            .iter()
            .min_by_key(|a| state.outstanding.get(*a).copied().unwrap_or(0))
            .unwrap_or(&addresses[0]);
        Ok(least_loaded.clone())
    }

    /// 记录一次在途调用，返回值释放时计数减一
    pub fn track_call(&self, address: &str) -> OutstandingCall<'_> {
        if let Ok(mut state) = self.state() {
            *state.outstanding.entry(address.to_string()).or_insert(0) += 1;
        }
        OutstandingCall {
            router: self,
            address: address.to_string(),
        }
    }
}

pub struct OutstandingCall<'a> {
    router: &'a ExecutorRouter,
    address: String,
}

impl Drop for OutstandingCall<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.router.state() {
            if let Some(count) = state.outstanding.get_mut(&self.address) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    state.outstanding.remove(&self.address);
                }
            }
        }
    }
}

fn hash_key(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// 一致性哈希：每个地址映射 100 个虚拟节点，任务落在顺时针方向的第一个节点
fn consistent_hash(job_id: i64, addresses: &[String]) -> String {
    let mut ring = BTreeMap::new();
    for address in addresses {
        for node in 0..VIRTUAL_NODE_COUNT {
            ring.insert(hash_key(&format!("SHARD-{address}-NODE-{node}")), address);
        }
    }

    let job_hash = hash_key(&job_id.to_string());
    ring.range(job_hash..)
        .next()
        .or_else(|| ring.iter().next())
        .map(|(_, address)| (*address).clone())
        .unwrap_or_else(|| addresses[0].clone())
}
