//! 秒级时间轮
//!
//! 槽位数即时间轮覆盖的秒数，任务按触发秒数对槽位数取模落槽。
//! 后台收割协程在每个整秒醒来，取出从上次收割到当前秒之间所有槽位的任务，
//! 每个任务在独立的协程中交给处理器执行。

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scheduler_core::{SchedulerError, SchedulerResult};

/// 到期任务处理器
#[async_trait]
pub trait WheelTaskHandler<T>: Send + Sync {
    async fn fire(&self, task: T);
}

struct WheelState<T> {
    slots: Vec<Vec<T>>,
    /// 最近一次已收割的秒
    last_drained: i64,
}

pub struct TimeWheel<T> {
    name: String,
    slot_count: usize,
    state: Mutex<WheelState<T>>,
    handler: Arc<dyn WheelTaskHandler<T>>,
    cancel: CancellationToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> TimeWheel<T> {
    pub fn new(
        name: impl Into<String>,
        slot_count: usize,
        handler: Arc<dyn WheelTaskHandler<T>>,
    ) -> SchedulerResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SchedulerError::config_error("时间轮名称不能为空"));
        }
        if slot_count == 0 {
            return Err(SchedulerError::config_error("时间轮槽位数必须大于0"));
        }

        let slots = (0..slot_count).map(|_| Vec::new()).collect();
        Ok(Self {
            name,
            slot_count,
            state: Mutex::new(WheelState {
                slots,
                last_drained: Utc::now().timestamp() - 1,
            }),
            handler,
            cancel: CancellationToken::new(),
            reaper: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    fn state(&self) -> SchedulerResult<MutexGuard<'_, WheelState<T>>> {
        self.state
            .lock()
            .map_err(|_| SchedulerError::internal(format!("时间轮 {} 锁已中毒", self.name)))
    }

    /// 在 `fire_at_ms` 触发任务
    ///
    /// 已到期的任务立即在新协程中执行；超出时间轮覆盖范围的任务被拒绝，调用方需稍后重新提交。
    pub fn add_task(&self, task: T, fire_at_ms: i64) -> SchedulerResult<()> {
        let mut state = self.state()?;
        let now_ms = Utc::now().timestamp_millis();

        if fire_at_ms <= now_ms {
            drop(state);
            self.spawn_fire(task, Duration::ZERO);
            return Ok(());
        }

        let fire_second = fire_at_ms.div_euclid(1000);
        let delay_seconds = fire_second - now_ms.div_euclid(1000);
        if delay_seconds >= self.slot_count as i64 {
            return Err(SchedulerError::TimeWheelCapacityExceeded {
                delay_seconds,
                slot_count: self.slot_count,
            });
        }

        if fire_second <= state.last_drained {
            // 所在秒的槽位已收割，直接按剩余毫秒延迟执行
            drop(state);
            let remaining = (fire_at_ms - now_ms) as u64;
            self.spawn_fire(task, Duration::from_millis(remaining));
            return Ok(());
        }

        let slot = fire_second.rem_euclid(self.slot_count as i64) as usize;
        state.slots[slot].push(task);
        debug!("时间轮 {} 加入任务: 槽位 {}, 延迟 {} 秒", self.name, slot, delay_seconds);
        Ok(())
    }

    /// 当前挂在槽位上的任务数
    pub fn pending_count(&self) -> usize {
        self.state()
            .map(|s| s.slots.iter().map(Vec::len).sum())
            .unwrap_or_default()
    }

    /// 取出截至 `now_ms` 所在秒的全部到期任务
    fn drain_due(&self, now_ms: i64) -> SchedulerResult<Vec<T>> {
        let mut state = self.state()?;
        let now_second = now_ms.div_euclid(1000);
        if now_second <= state.last_drained {
            return Ok(Vec::new());
        }

        let from = (state.last_drained + 1).max(now_second - self.slot_count as i64 + 1);
        let mut due = Vec::new();
        for second in from..=now_second {
            let slot = second.rem_euclid(self.slot_count as i64) as usize;
            due.append(&mut state.slots[slot]);
        }
        state.last_drained = now_second;
        Ok(due)
    }

    fn spawn_fire(&self, task: T, delay: Duration) {
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            handler.fire(task).await;
        });
    }

    /// 启动收割协程，重复调用无效
    pub fn start(self: &Arc<Self>) {
        let Ok(mut reaper) = self.reaper.lock() else {
            warn!("时间轮 {} 启动失败: 锁已中毒", self.name);
            return;
        };
        if reaper.is_some() {
            return;
        }

        let wheel = Arc::clone(self);
        *reaper = Some(tokio::spawn(async move { wheel.reap_loop().await }));
        info!("时间轮 {} 已启动, 槽位数 {}", self.name, self.slot_count);
    }

    async fn reap_loop(&self) {
        loop {
            let millis_into_second = Utc::now().timestamp_subsec_millis() as u64;
            let wait = Duration::from_millis(1000 - millis_into_second.min(999));

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            match self.drain_due(Utc::now().timestamp_millis()) {
                Ok(due) => {
                    if !due.is_empty() {
                        debug!("时间轮 {} 到期任务 {} 个", self.name, due.len());
                    }
                    for task in due {
                        self.spawn_fire(task, Duration::ZERO);
                    }
                }
                Err(e) => warn!("时间轮 {} 收割失败: {}", self.name, e),
            }
        }
        info!("时间轮 {} 已停止", self.name);
    }

    /// 停止收割协程，未到期的任务被丢弃
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
