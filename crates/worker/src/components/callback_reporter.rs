use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use scheduler_core::HandleCallbackParam;
use scheduler_domain::AdminClient;

/// 单批最多上报的回调数
const MAX_BATCH: usize = 100;

/// 执行结果回调上报
///
/// 从运行时的回调通道收集结果，按批次上报调度中心。上报失败的批次保留到下一轮重试，
/// 关闭时尽力上报剩余结果。
pub struct CallbackReporter {
    admin_client: Arc<dyn AdminClient>,
    retry_interval: Duration,
}

impl CallbackReporter {
    pub fn new(admin_client: Arc<dyn AdminClient>, retry_interval: Duration) -> Self {
        Self {
            admin_client,
            retry_interval,
        }
    }

    /// 上报一批回调，返回是否成功
    pub async fn report(&self, batch: &[HandleCallbackParam]) -> bool {
        if batch.is_empty() {
            return true;
        }
        match self.admin_client.callback(batch).await {
            Ok(ret) if ret.is_success() => {
                debug!("Reported {} callbacks", batch.len());
                true
            }
            Ok(ret) => {
                warn!("Callback rejected: {}", ret.message());
                false
            }
            Err(e) => {
                warn!("Callback failed: {}", e);
                false
            }
        }
    }

    pub async fn run(
        &self,
        mut callback_rx: mpsc::UnboundedReceiver<HandleCallbackParam>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Starting callback reporter");
        let mut pending: Vec<HandleCallbackParam> = Vec::new();

        loop {
            if pending.is_empty() {
                tokio::select! {
                    received = callback_rx.recv() => match received {
                        Some(callback) => pending.push(callback),
                        None => break,
                    },
                    _ = shutdown_rx.recv() => break,
                }
            }

            while pending.len() < MAX_BATCH {
                match callback_rx.try_recv() {
                    Ok(callback) => pending.push(callback),
                    Err(_) => break,
                }
            }

            let batch_len = pending.len().min(MAX_BATCH);
            if self.report(&pending[..batch_len]).await {
                pending.drain(..batch_len);
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.retry_interval) => {}
                _ = shutdown_rx.recv() => break,
            }
        }

        while let Ok(callback) = callback_rx.try_recv() {
            pending.push(callback);
        }
        for chunk in pending.chunks(MAX_BATCH) {
            if !self.report(chunk).await {
                warn!("Dropping {} callbacks on shutdown", chunk.len());
            }
        }
        info!("Callback reporter stopped");
    }
}
