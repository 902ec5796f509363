//! 调度中心与执行器之间的 HTTP+JSON 报文
//!
//! 字段使用 camelCase 命名，所有响应统一为 [`ReturnT`]。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 访问令牌请求头
pub const ACCESS_TOKEN_HEADER: &str = "XXL-JOB-ACCESS-TOKEN";

/// 执行器注册分组
pub const REGISTRY_GROUP_EXECUTOR: &str = "EXECUTOR";

pub const SUCCESS_CODE: i32 = 200;
pub const FAIL_CODE: i32 = 500;

/// 统一响应体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnT {
    pub code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl ReturnT {
    pub fn success() -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: None,
            content: None,
        }
    }

    pub fn success_with(content: Value) -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: None,
            content: Some(content),
        }
    }

    pub fn fail<S: Into<String>>(msg: S) -> Self {
        Self {
            code: FAIL_CODE,
            msg: Some(msg.into()),
            content: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// 失败原因，`msg` 为空时回退到 `content`
    pub fn message(&self) -> String {
        match (&self.msg, &self.content) {
            (Some(msg), _) => msg.clone(),
            (None, Some(Value::String(s))) => s.clone(),
            (None, Some(other)) => other.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// 触发参数，调度中心 -> 执行器 `/run`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerParam {
    pub job_id: i64,
    pub executor_handler: String,
    #[serde(default)]
    pub executor_params: String,
    #[serde(default)]
    pub executor_block_strategy: String,
    /// 超时时间，单位秒，小于等于0表示不限制
    #[serde(default)]
    pub executor_timeout: i64,
    #[serde(default)]
    pub log_id: i64,
    /// 触发时间，unix 秒
    #[serde(default)]
    pub log_date_time: i64,
    #[serde(default)]
    pub glue_type: String,
    #[serde(default)]
    pub glue_source: String,
    #[serde(default)]
    pub glue_update_time: i64,
    #[serde(default)]
    pub broadcast_index: i32,
    #[serde(default = "default_broadcast_total")]
    pub broadcast_total: i32,
}

fn default_broadcast_total() -> i32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillParam {
    pub job_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdleBeatParam {
    pub job_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogParam {
    pub log_id: i64,
    pub log_date_time: i64,
    pub from_line_num: i32,
}

/// `/log` 的响应内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogResult {
    pub from_line_num: i32,
    pub to_line_num: i32,
    pub log_content: String,
    pub is_end: bool,
}

/// 执行器注册参数，执行器 -> 调度中心
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryParam {
    pub registry_group: String,
    pub registry_key: String,
    pub registry_value: String,
}

impl RegistryParam {
    pub fn executor<K: Into<String>, V: Into<String>>(app_name: K, address: V) -> Self {
        Self {
            registry_group: REGISTRY_GROUP_EXECUTOR.to_string(),
            registry_key: app_name.into(),
            registry_value: address.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.registry_group.trim().is_empty()
            && !self.registry_key.trim().is_empty()
            && !self.registry_value.trim().is_empty()
    }
}

/// 执行结果回调，执行器 -> 调度中心
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleCallbackParam {
    pub log_id: i64,
    pub log_date_time: i64,
    pub handle_code: i32,
    #[serde(default)]
    pub handle_msg: String,
}
