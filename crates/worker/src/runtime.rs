//! 执行器运行时
//!
//! 每个 jobId 至多对应一个 [`RuntimeJob`]，它持有一个容量为 1 的投递通道和一个独立的分发循环。
//! 分发循环逐个取出触发参数并等待处理器执行结束后才接收下一个，因此同一任务内串行执行；
//! 通道容量为 1，调用方在上一条被分发循环取走前会一直等待。
//!
//! 任务表由一把读写锁保护：查询走共享锁，创建、替换、移除在独占锁内一次完成。

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scheduler_core::{
    HandleCallbackParam, SchedulerError, SchedulerResult, TriggerParam, FAIL_CODE, SUCCESS_CODE,
};
use scheduler_domain::{BlockStrategy, GlueType};
use scheduler_infrastructure::MetricsCollector;

use crate::handler::{HandlerRegistry, JobContext, JobHandler};

struct RuntimeJob {
    handler_name: String,
    sender: mpsc::Sender<TriggerParam>,
    cancel: CancellationToken,
    /// 已投递但尚未执行完成的触发数，包括正在执行的一个
    in_flight: Arc<AtomicUsize>,
}

impl RuntimeJob {
    fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// 计入一次在途触发；DISCARD_LATER 只在空闲时成功
    fn claim(&self, block: BlockStrategy) -> bool {
        if block == BlockStrategy::DiscardLater {
            return self
                .in_flight
                .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn claimed(&self) -> (mpsc::Sender<TriggerParam>, InFlightClaim) {
        let claim = InFlightClaim {
            in_flight: Arc::clone(&self.in_flight),
            delivered: false,
        };
        (self.sender.clone(), claim)
    }
}

/// 已计入在途数的一次触发，未投递到分发循环就被丢弃时撤销计数
struct InFlightClaim {
    in_flight: Arc<AtomicUsize>,
    delivered: bool,
}

impl InFlightClaim {
    /// 投递成功后由分发循环负责扣减
    fn delivered(mut self) {
        self.delivered = true;
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        if !self.delivered {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// 一次投递在任务表上的结果
enum Placement {
    /// 投递到现有通道
    Reuse,
    /// 新建分发循环
    Create,
    /// 终止现有分发循环后新建
    Replace(&'static str),
    /// 丢弃本次触发
    Discard,
}

fn place(existing: Option<&RuntimeJob>, handler_name: &str, block: BlockStrategy) -> Placement {
    let Some(job) = existing else {
        return Placement::Create;
    };
    if job.handler_name != handler_name {
        return Placement::Replace("更换处理器, 终止旧的分发循环");
    }
    match block {
        BlockStrategy::SerialExecution => Placement::Reuse,
        BlockStrategy::DiscardLater if job.is_busy() => Placement::Discard,
        BlockStrategy::DiscardLater => Placement::Reuse,
        BlockStrategy::CoverEarly if job.is_busy() => Placement::Replace("覆盖之前调度"),
        BlockStrategy::CoverEarly => Placement::Reuse,
    }
}

pub struct JobRuntime {
    jobs: RwLock<HashMap<i64, RuntimeJob>>,
    handlers: Arc<HandlerRegistry>,
    callback_tx: mpsc::UnboundedSender<HandleCallbackParam>,
    root: CancellationToken,
    metrics: Arc<MetricsCollector>,
}

impl JobRuntime {
    pub fn new(
        handlers: Arc<HandlerRegistry>,
        callback_tx: mpsc::UnboundedSender<HandleCallbackParam>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            handlers,
            callback_tx,
            root: CancellationToken::new(),
            metrics,
        }
    }

    /// 接收一次触发
    ///
    /// 返回时触发已被分发循环接收；被阻塞策略丢弃时返回 [`SchedulerError::ExecutorBusy`]。
    pub async fn run(&self, param: TriggerParam) -> SchedulerResult<()> {
        let glue_type = parse_or_default::<GlueType>(&param.glue_type)?;
        if glue_type != GlueType::Bean {
            return Err(SchedulerError::not_implemented(format!(
                "运行模式 {glue_type}"
            )));
        }
        let block = parse_or_default::<BlockStrategy>(&param.executor_block_strategy)?;
        let handler = self
            .handlers
            .get(&param.executor_handler)
            .ok_or_else(|| SchedulerError::HandlerNotFound(param.executor_handler.clone()))?;

        let (sender, claim) = self.claim_slot(&param, block, handler).await?;
        debug!("任务 {} 投递触发, 日志 {}", param.job_id, param.log_id);

        // 调用方在等待通道时放弃本次调用，claim 随之丢弃并撤销计数
        if let Err(mpsc::error::SendError(param)) = sender.send(param).await {
            return Err(SchedulerError::TaskExecution(format!(
                "任务 {} 已被终止",
                param.job_id
            )));
        }
        claim.delivered();
        Ok(())
    }

    /// 在任务表上为本次触发找到投递通道，并计入在途数
    async fn claim_slot(
        &self,
        param: &TriggerParam,
        block: BlockStrategy,
        handler: Arc<dyn JobHandler>,
    ) -> SchedulerResult<(mpsc::Sender<TriggerParam>, InFlightClaim)> {
        {
            let jobs = self.jobs.read().await;
            if let Some(job) = jobs.get(&param.job_id) {
                let reusable = matches!(
                    place(Some(job), &param.executor_handler, block),
                    Placement::Reuse
                );
                if reusable && job.claim(block) {
                    return Ok(job.claimed());
                }
            }
        }

        // 读锁释放后任务表可能已变化，在写锁内重新判断
        let mut jobs = self.jobs.write().await;
        match place(jobs.get(&param.job_id), &param.executor_handler, block) {
            Placement::Reuse => {
                let job = jobs
                    .get(&param.job_id)
                    .ok_or_else(|| SchedulerError::internal("任务表状态不一致"))?;
                if job.claim(block) {
                    Ok(job.claimed())
                } else {
                    Err(self.discard(param.job_id))
                }
            }
            Placement::Discard => Err(self.discard(param.job_id)),
            placement => {
                if let Placement::Replace(reason) = placement {
                    if let Some(old) = jobs.remove(&param.job_id) {
                        info!("任务 {} {}", param.job_id, reason);
                        old.cancel.cancel();
                    }
                }
                let job = self.spawn_job(param.job_id, &param.executor_handler, handler);
                job.in_flight.fetch_add(1, Ordering::SeqCst);
                let claimed = job.claimed();
                jobs.insert(param.job_id, job);
                Ok(claimed)
            }
        }
    }

    fn discard(&self, job_id: i64) -> SchedulerError {
        self.metrics.record_discarded_trigger(job_id);
        warn!("任务 {} 正在执行, 丢弃后续调度", job_id);
        SchedulerError::ExecutorBusy(format!("阻塞处理策略生效: {}", BlockStrategy::DiscardLater))
    }

    fn spawn_job(&self, job_id: i64, handler_name: &str, handler: Arc<dyn JobHandler>) -> RuntimeJob {
        let (sender, receiver) = mpsc::channel(1);
        let cancel = self.root.child_token();
        let in_flight = Arc::new(AtomicUsize::new(0));

        let dispatch = DispatchLoop {
            job_id,
            handler_name: handler_name.to_string(),
            handler,
            receiver,
            cancel: cancel.clone(),
            in_flight: Arc::clone(&in_flight),
            callback_tx: self.callback_tx.clone(),
            metrics: Arc::clone(&self.metrics),
        };
        tokio::spawn(dispatch.run());
        info!("任务 {} 启动分发循环, 处理器 {}", job_id, handler_name);

        RuntimeJob {
            handler_name: handler_name.to_string(),
            sender,
            cancel,
            in_flight,
        }
    }

    /// 终止任务，返回任务此前是否存在
    pub async fn kill(&self, job_id: i64) -> bool {
        let removed = self.jobs.write().await.remove(&job_id);
        match removed {
            Some(job) => {
                job.cancel.cancel();
                info!("任务 {} 已终止", job_id);
                true
            }
            None => false,
        }
    }

    /// 任务不存在时视为空闲
    pub async fn idle_beat(&self, job_id: i64) -> SchedulerResult<()> {
        if self.jobs.read().await.contains_key(&job_id) {
            return Err(SchedulerError::ExecutorBusy(format!("任务 {job_id} 正在运行")));
        }
        Ok(())
    }

    pub async fn contains(&self, job_id: i64) -> bool {
        self.jobs.read().await.contains_key(&job_id)
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// 终止全部任务
    pub async fn shutdown(&self) {
        self.root.cancel();
        let mut jobs = self.jobs.write().await;
        let count = jobs.len();
        jobs.clear();
        info!("执行器运行时已关闭, 终止任务 {} 个", count);
    }
}

fn parse_or_default<T: FromStr<Err = SchedulerError> + Default>(raw: &str) -> SchedulerResult<T> {
    if raw.trim().is_empty() {
        Ok(T::default())
    } else {
        raw.parse()
    }
}

fn send_callback(
    tx: &mpsc::UnboundedSender<HandleCallbackParam>,
    param: &TriggerParam,
    handle_code: i32,
    handle_msg: String,
) {
    let callback = HandleCallbackParam {
        log_id: param.log_id,
        log_date_time: param.log_date_time,
        handle_code,
        handle_msg,
    };
    if tx.send(callback).is_err() {
        debug!("回调通道已关闭, 丢弃日志 {} 的执行结果", param.log_id);
    }
}

struct DispatchLoop {
    job_id: i64,
    handler_name: String,
    handler: Arc<dyn JobHandler>,
    receiver: mpsc::Receiver<TriggerParam>,
    cancel: CancellationToken,
    in_flight: Arc<AtomicUsize>,
    callback_tx: mpsc::UnboundedSender<HandleCallbackParam>,
    metrics: Arc<MetricsCollector>,
}

impl DispatchLoop {
    async fn run(mut self) {
        if let Err(e) = self.handler.init().await {
            warn!("处理器 {} 初始化失败: {}", self.handler_name, e);
        }

        loop {
            let param = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                received = self.receiver.recv() => match received {
                    Some(param) => param,
                    None => break,
                },
            };

            let (code, msg) = self.execute(&param).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            send_callback(&self.callback_tx, &param, code, msg);
        }

        // 通道中尚未执行的触发按失败回调
        self.receiver.close();
        while let Ok(param) = self.receiver.try_recv() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            send_callback(&self.callback_tx, &param, FAIL_CODE, "任务已被终止".to_string());
        }

        if let Err(e) = self.handler.destroy().await {
            warn!("处理器 {} 销毁失败: {}", self.handler_name, e);
        }
        debug!("任务 {} 分发循环退出", self.job_id);
    }

    async fn execute(&self, param: &TriggerParam) -> (i32, String) {
        let scope = self.cancel.child_token();
        let ctx = JobContext::new(param, scope.clone());
        let started = Instant::now();

        let outcome = if param.executor_timeout > 0 {
            let execution = self.handler.execute(ctx);
            tokio::pin!(execution);
            let limit = Duration::from_secs(param.executor_timeout as u64);
            match tokio::time::timeout(limit, &mut execution).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("任务 {} 执行超时, 等待处理器响应取消", self.job_id);
                    scope.cancel();
                    let _ = execution.await;
                    Err(SchedulerError::ExecutionTimeout)
                }
            }
        } else {
            self.handler.execute(ctx).await
        };

        let success = outcome.is_ok();
        self.metrics.record_handler_execution(
            &self.handler_name,
            success,
            started.elapsed().as_secs_f64(),
        );
        match outcome {
            Ok(msg) => (SUCCESS_CODE, msg),
            Err(e) if self.cancel.is_cancelled() => (FAIL_CODE, format!("任务已被终止: {e}")),
            Err(e) => (FAIL_CODE, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 记录执行顺序，每次执行持续 `delay`，收到取消后立即返回
    struct RecordingHandler {
        delay: Duration,
        events: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl JobHandler for RecordingHandler {
        async fn execute(&self, ctx: JobContext) -> SchedulerResult<String> {
            self.events.lock().unwrap().push(format!("start:{}", ctx.param));
            tokio::select! {
                _ = ctx.cancelled() => {
                    self.events.lock().unwrap().push(format!("cancel:{}", ctx.param));
                    return Err(SchedulerError::TaskExecution("cancelled".into()));
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
            self.events.lock().unwrap().push(format!("end:{}", ctx.param));
            Ok(ctx.param)
        }
    }

    struct Fixture {
        runtime: Arc<JobRuntime>,
        events: Arc<Mutex<Vec<String>>>,
        callbacks: mpsc::UnboundedReceiver<HandleCallbackParam>,
    }

    fn fixture(delay_ms: u64) -> Fixture {
        let events = Arc::new(Mutex::new(Vec::new()));
        let handlers = Arc::new(HandlerRegistry::new());
        for name in ["demo", "other"] {
            handlers
                .register(
                    name,
                    Arc::new(RecordingHandler {
                        delay: Duration::from_millis(delay_ms),
                        events: events.clone(),
                    }),
                )
                .unwrap();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(JobRuntime::new(handlers, tx, Arc::new(MetricsCollector::new())));
        Fixture {
            runtime,
            events,
            callbacks: rx,
        }
    }

    fn trigger(handler: &str, param: &str, block: BlockStrategy, log_id: i64) -> TriggerParam {
        TriggerParam {
            job_id: 1,
            executor_handler: handler.to_string(),
            executor_params: param.to_string(),
            executor_block_strategy: block.as_str().to_string(),
            executor_timeout: 0,
            log_id,
            log_date_time: 0,
            glue_type: "BEAN".to_string(),
            glue_source: String::new(),
            glue_update_time: 0,
            broadcast_index: 0,
            broadcast_total: 1,
        }
    }

    async fn next_callback(rx: &mut mpsc::UnboundedReceiver<HandleCallbackParam>) -> HandleCallbackParam {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    async fn in_flight(runtime: &JobRuntime, job_id: i64) -> usize {
        runtime.jobs.read().await[&job_id].in_flight.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_serial_execution_preserves_order() {
        let mut f = fixture(50);
        for (i, p) in ["t1", "t2", "t3"].iter().enumerate() {
            f.runtime
                .run(trigger("demo", p, BlockStrategy::SerialExecution, i as i64 + 1))
                .await
                .unwrap();
        }

        for expected in 1..=3 {
            let callback = next_callback(&mut f.callbacks).await;
            assert_eq!(callback.log_id, expected);
            assert_eq!(callback.handle_code, SUCCESS_CODE);
        }
        let events = f.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["start:t1", "end:t1", "start:t2", "end:t2", "start:t3", "end:t3"]
        );
    }

    #[tokio::test]
    async fn test_concurrent_serial_triggers_wait_for_running_one() {
        let mut f = fixture(200);
        let mut pending = Vec::new();
        for (i, p) in ["t1", "t2", "t3"].iter().enumerate() {
            let runtime = f.runtime.clone();
            let param = trigger("demo", p, BlockStrategy::SerialExecution, i as i64 + 1);
            pending.push(tokio::spawn(async move { runtime.run(param).await }));
        }

        // 一个在执行、一个在通道里，第三个调用要等第一个处理器返回
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!f.events.lock().unwrap().iter().any(|e| e.starts_with("end:")));
        assert_eq!(pending.iter().filter(|h| h.is_finished()).count(), 2);

        for handle in pending {
            handle.await.unwrap().unwrap();
        }
        for _ in 0..3 {
            assert_eq!(next_callback(&mut f.callbacks).await.handle_code, SUCCESS_CODE);
        }

        let events = f.events.lock().unwrap().clone();
        assert_eq!(events.len(), 6);
        for pair in events.chunks(2) {
            let started = pair[0].strip_prefix("start:").unwrap();
            assert_eq!(pair[1], format!("end:{started}"));
        }
    }

    #[tokio::test]
    async fn test_abandoned_run_releases_in_flight() {
        let mut f = fixture(200);
        f.runtime
            .run(trigger("demo", "t1", BlockStrategy::SerialExecution, 1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        f.runtime
            .run(trigger("demo", "t2", BlockStrategy::SerialExecution, 2))
            .await
            .unwrap();

        let blocked = {
            let runtime = f.runtime.clone();
            tokio::spawn(async move {
                runtime
                    .run(trigger("demo", "t3", BlockStrategy::SerialExecution, 3))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());
        blocked.abort();
        assert!(blocked.await.unwrap_err().is_cancelled());

        assert_eq!(in_flight(&f.runtime, 1).await, 2);

        next_callback(&mut f.callbacks).await;
        next_callback(&mut f.callbacks).await;
        assert_eq!(in_flight(&f.runtime, 1).await, 0);
        f.runtime
            .run(trigger("demo", "t4", BlockStrategy::DiscardLater, 4))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_handler_and_glue_type_fail_fast() {
        let f = fixture(10);
        let err = f
            .runtime
            .run(trigger("missing", "x", BlockStrategy::SerialExecution, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::HandlerNotFound(_)));

        let mut glue = trigger("demo", "x", BlockStrategy::SerialExecution, 2);
        glue.glue_type = "GLUE_SHELL".to_string();
        let err = f.runtime.run(glue).await.unwrap_err();
        assert!(matches!(err, SchedulerError::NotImplemented(_)));
        assert_eq!(f.runtime.job_count().await, 0);
    }

    #[tokio::test]
    async fn test_kill_cancels_running_handler() {
        let mut f = fixture(10_000);
        f.runtime
            .run(trigger("demo", "long", BlockStrategy::SerialExecution, 1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(f.runtime.kill(1).await);
        let callback = next_callback(&mut f.callbacks).await;
        assert_eq!(callback.handle_code, FAIL_CODE);
        assert!(!f.runtime.contains(1).await);
        assert!(f.events.lock().unwrap().contains(&"cancel:long".to_string()));

        assert!(!f.runtime.kill(1).await);
    }

    #[tokio::test]
    async fn test_idle_beat_reports_busy_while_job_exists() {
        let f = fixture(10);
        f.runtime.idle_beat(1).await.unwrap();
        f.runtime
            .run(trigger("demo", "x", BlockStrategy::SerialExecution, 1))
            .await
            .unwrap();
        assert!(matches!(
            f.runtime.idle_beat(1).await,
            Err(SchedulerError::ExecutorBusy(_))
        ));
    }

    #[tokio::test]
    async fn test_handler_switch_replaces_loop() {
        let mut f = fixture(10_000);
        f.runtime
            .run(trigger("demo", "first", BlockStrategy::SerialExecution, 1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        f.runtime
            .run(trigger("other", "second", BlockStrategy::SerialExecution, 2))
            .await
            .unwrap();

        let callback = next_callback(&mut f.callbacks).await;
        assert_eq!(callback.log_id, 1);
        assert_eq!(callback.handle_code, FAIL_CODE);
        assert_eq!(f.runtime.job_count().await, 1);
    }

    #[tokio::test]
    async fn test_discard_later_rejects_while_busy() {
        let f = fixture(300);
        f.runtime
            .run(trigger("demo", "first", BlockStrategy::DiscardLater, 1))
            .await
            .unwrap();

        let err = f
            .runtime
            .run(trigger("demo", "second", BlockStrategy::DiscardLater, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ExecutorBusy(_)));

        tokio::time::sleep(Duration::from_millis(500)).await;
        f.runtime
            .run(trigger("demo", "third", BlockStrategy::DiscardLater, 3))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cover_early_cancels_running_trigger() {
        let mut f = fixture(10_000);
        f.runtime
            .run(trigger("demo", "old", BlockStrategy::CoverEarly, 1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        f.runtime
            .run(trigger("demo", "new", BlockStrategy::CoverEarly, 2))
            .await
            .unwrap();

        let callback = next_callback(&mut f.callbacks).await;
        assert_eq!(callback.log_id, 1);
        assert_eq!(callback.handle_code, FAIL_CODE);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.events.lock().unwrap().contains(&"start:new".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_cancels_handler_scope() {
        let mut f = fixture(10_000);
        let mut param = trigger("demo", "slow", BlockStrategy::SerialExecution, 1);
        param.executor_timeout = 1;
        f.runtime.run(param).await.unwrap();

        let callback = next_callback(&mut f.callbacks).await;
        assert_eq!(callback.handle_code, FAIL_CODE);
        assert!(callback.handle_msg.contains("超时"));
        // 超时只取消本次执行，分发循环继续存在
        assert!(f.runtime.contains(1).await);
    }
}
