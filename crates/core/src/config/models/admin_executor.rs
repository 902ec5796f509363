use serde::{Deserialize, Serialize};

/// 调度中心配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub bind_address: String,
    /// 为空时不校验访问令牌
    pub access_token: String,
    pub time_wheel_slots: usize,
    /// 预读窗口，扫描 `next_trigger_time < now + pre_read_ms` 的任务
    pub pre_read_ms: i64,
    pub misfire_threshold_ms: i64,
    pub registry_monitor_interval_seconds: u64,
    /// 超过该时长未心跳的注册记录视为死亡
    pub registry_dead_timeout_seconds: i64,
    /// 调用执行器 HTTP 接口的超时时间
    pub executor_timeout_seconds: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            access_token: String::new(),
            time_wheel_slots: 300,
            pre_read_ms: 5000,
            misfire_threshold_ms: 5000,
            registry_monitor_interval_seconds: 10,
            registry_dead_timeout_seconds: 30,
            executor_timeout_seconds: 3,
        }
    }
}

impl AdminConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(anyhow::anyhow!("无效的调度中心监听地址: {}", self.bind_address));
        }

        if self.time_wheel_slots == 0 {
            return Err(anyhow::anyhow!("时间轮槽位数必须大于0"));
        }

        if self.pre_read_ms <= 0 {
            return Err(anyhow::anyhow!("预读窗口必须大于0"));
        }

        // 预读窗口内的任务必须能放进时间轮
        if self.pre_read_ms / 1000 >= self.time_wheel_slots as i64 {
            return Err(anyhow::anyhow!(
                "预读窗口 {}ms 超出时间轮范围 {} 秒",
                self.pre_read_ms,
                self.time_wheel_slots
            ));
        }

        if self.misfire_threshold_ms < 0 {
            return Err(anyhow::anyhow!("过期阈值不能为负数"));
        }

        if self.registry_monitor_interval_seconds == 0 {
            return Err(anyhow::anyhow!("注册监控间隔必须大于0"));
        }

        if self.registry_dead_timeout_seconds <= 0 {
            return Err(anyhow::anyhow!("注册超时时间必须大于0"));
        }

        if self.executor_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("执行器调用超时时间必须大于0"));
        }

        Ok(())
    }
}

/// 执行器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub enabled: bool,
    /// 注册到调度中心的分组键
    pub app_name: String,
    pub bind_address: String,
    /// 对外注册的地址，为空时由 `ip` 与监听端口拼出
    pub address: Option<String>,
    /// 为空时使用主机名
    pub ip: String,
    pub admin_addresses: Vec<String>,
    pub access_token: String,
    pub heartbeat_interval_seconds: u64,
    pub callback_interval_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_name: "job-executor-sample".to_string(),
            bind_address: "0.0.0.0:9999".to_string(),
            address: None,
            ip: "127.0.0.1".to_string(),
            admin_addresses: vec!["http://127.0.0.1:8080".to_string()],
            access_token: String::new(),
            heartbeat_interval_seconds: 5,
            callback_interval_seconds: 1,
            request_timeout_seconds: 3,
        }
    }
}

impl ExecutorConfig {
    /// 执行器对外注册的地址
    pub fn registry_address(&self) -> String {
        let port = self
            .bind_address
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or(9999);
        self.registry_address_for_port(port)
    }

    /// 按实际监听端口拼出注册地址，`address` 已配置时直接使用
    pub fn registry_address_for_port(&self, port: u16) -> String {
        if let Some(address) = self.address.as_ref().filter(|a| !a.is_empty()) {
            return address.clone();
        }
        let host = if self.ip.is_empty() {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "127.0.0.1".to_string())
        } else {
            self.ip.clone()
        };
        format!("http://{host}:{port}/")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(anyhow::anyhow!("执行器AppName不能为空"));
        }

        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(anyhow::anyhow!("无效的执行器监听地址: {}", self.bind_address));
        }

        if self.admin_addresses.is_empty() {
            return Err(anyhow::anyhow!("调度中心地址不能为空"));
        }

        for address in &self.admin_addresses {
            if !address.starts_with("http://") && !address.starts_with("https://") {
                return Err(anyhow::anyhow!("无效的调度中心地址: {}", address));
            }
        }

        if self.heartbeat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }

        if self.callback_interval_seconds == 0 {
            return Err(anyhow::anyhow!("回调间隔必须大于0"));
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }

        Ok(())
    }
}
