//! 内置任务处理器
//!
//! `executorParams` 可以是 JSON 对象，也可以是简写形式：
//! 命令处理器的简写是一行 shell 命令，HTTP 处理器的简写是一个 URL。

use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{info, warn};

use scheduler_core::{SchedulerError, SchedulerResult};

use crate::handler::{JobContext, JobHandler};

/// 命令处理器参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandParams {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
}

impl CommandParams {
    pub fn parse(raw: &str) -> SchedulerResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SchedulerError::TaskExecution("命令参数不能为空".to_string()));
        }
        if raw.starts_with('{') {
            return serde_json::from_str(raw)
                .map_err(|e| SchedulerError::Serialization(format!("解析命令参数失败: {e}")));
        }
        Ok(Self {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), raw.to_string()],
            working_dir: None,
            env_vars: HashMap::new(),
        })
    }
}

/// 以子进程方式运行命令，任务被终止时结束子进程
#[derive(Debug, Default)]
pub struct CommandJobHandler;

impl CommandJobHandler {
    pub fn new() -> Self {
        Self
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_string(&mut buf).await {
            warn!("读取子进程输出失败: {}", e);
        }
    }
    buf
}

#[async_trait]
impl JobHandler for CommandJobHandler {
    async fn execute(&self, ctx: JobContext) -> SchedulerResult<String> {
        let params = CommandParams::parse(&ctx.param)?;
        info!(
            "执行命令任务: job_id={}, log_id={}, command={}, args={:?}",
            ctx.job_id, ctx.log_id, params.command, params.args
        );

        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env("SHARD_INDEX", ctx.shard_index.to_string())
            .env("SHARD_TOTAL", ctx.shard_total.to_string())
            .envs(&params.env_vars);
        if let Some(dir) = &params.working_dir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| SchedulerError::TaskExecution(format!("启动命令失败: {e}")))?;
        let stdout = tokio::spawn(read_all(child.stdout.take()));
        let stderr = tokio::spawn(read_all(child.stderr.take()));

        let status = tokio::select! {
            status = child.wait() => status
                .map_err(|e| SchedulerError::TaskExecution(format!("等待进程结束失败: {e}")))?,
            _ = ctx.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("结束子进程失败: job_id={}, error={}", ctx.job_id, e);
                }
                return Err(SchedulerError::TaskExecution("命令已被终止".to_string()));
            }
        };

        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();
        info!(
            "命令任务执行完成: job_id={}, exit_code={:?}, duration={}ms",
            ctx.job_id,
            status.code(),
            started.elapsed().as_millis()
        );

        if status.success() {
            Ok(stdout.trim_end().to_string())
        } else {
            let detail = if stderr.trim().is_empty() { stdout } else { stderr };
            Err(SchedulerError::TaskExecution(format!(
                "命令执行失败, 退出码 {:?}: {}",
                status.code(),
                detail.trim_end()
            )))
        }
    }
}

/// HTTP 处理器参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpParams {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl HttpParams {
    pub fn parse(raw: &str) -> SchedulerResult<Self> {
        let raw = raw.trim();
        let params = if raw.starts_with('{') {
            serde_json::from_str(raw)
                .map_err(|e| SchedulerError::Serialization(format!("解析HTTP参数失败: {e}")))?
        } else {
            Self {
                url: raw.to_string(),
                method: default_method(),
                headers: HashMap::new(),
                body: None,
                timeout_seconds: None,
            }
        };
        if !params.url.starts_with("http://") && !params.url.starts_with("https://") {
            return Err(SchedulerError::TaskExecution(format!(
                "无效的请求地址: {}",
                params.url
            )));
        }
        Ok(params)
    }
}

/// 发起一次 HTTP 请求，2xx 视为成功
pub struct HttpJobHandler {
    client: reqwest::Client,
}

impl Default for HttpJobHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpJobHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl JobHandler for HttpJobHandler {
    async fn execute(&self, ctx: JobContext) -> SchedulerResult<String> {
        let params = HttpParams::parse(&ctx.param)?;
        let method = reqwest::Method::from_bytes(params.method.to_uppercase().as_bytes())
            .map_err(|_| {
                SchedulerError::TaskExecution(format!("不支持的HTTP方法: {}", params.method))
            })?;
        info!(
            "执行HTTP任务: job_id={}, method={}, url={}",
            ctx.job_id, method, params.url
        );

        let mut request = self.client.request(method.clone(), &params.url);
        if let Some(timeout) = params.timeout_seconds {
            request = request.timeout(Duration::from_secs(timeout));
        }
        for (key, value) in &params.headers {
            request = request.header(key, value);
        }
        if let Some(body) = params.body {
            request = request.body(body);
        }

        let response = tokio::select! {
            response = request.send() => response
                .map_err(|e| SchedulerError::TaskExecution(format!("HTTP请求失败: {e}")))?,
            _ = ctx.cancelled() => {
                return Err(SchedulerError::TaskExecution("HTTP请求已被终止".to_string()));
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("读取响应体失败: {e}"));
        if status.is_success() {
            Ok(format!("HTTP {} {}\nStatus: {}\n{}", method, params.url, status.as_u16(), body))
        } else {
            Err(SchedulerError::TaskExecution(format!(
                "HTTP请求失败, 状态码 {}: {}",
                status.as_u16(),
                body
            )))
        }
    }
}

/// 示例处理器，输出参数与分片信息
#[derive(Debug, Default)]
pub struct DemoJobHandler;

#[async_trait]
impl JobHandler for DemoJobHandler {
    async fn execute(&self, ctx: JobContext) -> SchedulerResult<String> {
        info!(
            "demo job: job_id={}, log_id={}, shard={}/{}, param={}",
            ctx.job_id, ctx.log_id, ctx.shard_index, ctx.shard_total, ctx.param
        );
        Ok(format!(
            "分片 {}/{} 执行完成, 参数: {}",
            ctx.shard_index, ctx.shard_total, ctx.param
        ))
    }
}
