//! HTTP+JSON 传输
//!
//! 调度中心与执行器双向使用同一种报文约定：POST JSON，携带访问令牌请求头，
//! 响应体统一为 `ReturnT`。

pub mod http_executor_client;

pub use http_executor_client::HttpExecutorClient;

use std::time::Duration;

use scheduler_core::{ReturnT, SchedulerError, SchedulerResult, ACCESS_TOKEN_HEADER};
use serde::Serialize;
use tracing::debug;

/// 拼接基础地址与接口路径，兼容地址末尾是否带 `/`
pub fn endpoint(address: &str, path: &str) -> String {
    format!(
        "{}/{}",
        address.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[derive(Clone)]
pub struct TransportClient {
    client: reqwest::Client,
    access_token: String,
}

impl TransportClient {
    pub fn new(access_token: impl Into<String>, timeout: Duration) -> SchedulerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::network_error(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self {
            client,
            access_token: access_token.into(),
        })
    }

    /// POST JSON 并解析 `ReturnT`
    ///
    /// 非 2xx 状态码转换为失败的 `ReturnT`，连接失败与响应解析失败返回 `Err`。
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: Option<&T>,
    ) -> SchedulerResult<ReturnT> {
        let mut request = self.client.post(url);
        if !self.access_token.is_empty() {
            request = request.header(ACCESS_TOKEN_HEADER, &self.access_token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SchedulerError::network_error(format!("请求 {url} 失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            debug!("请求 {} 返回异常状态码: {}", url, status);
            return Ok(ReturnT::fail(format!("HTTP状态码异常: {status}")));
        }

        response
            .json::<ReturnT>()
            .await
            .map_err(|e| SchedulerError::Serialization(format!("解析 {url} 响应失败: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        assert_eq!(endpoint("http://127.0.0.1:9999/", "run"), "http://127.0.0.1:9999/run");
        assert_eq!(endpoint("http://127.0.0.1:9999", "/run"), "http://127.0.0.1:9999/run");
        assert_eq!(
            endpoint("http://admin:8080/", "api/registry"),
            "http://admin:8080/api/registry"
        );
    }
}
