use chrono::{DateTime, Utc};
use scheduler_core::SchedulerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 为以字符串持久化的封闭枚举生成 `as_str` / `Display` / `FromStr`
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = SchedulerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(SchedulerError::not_implemented(format!(
                        "{}: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

/// 调度类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleType {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "CRON")]
    Cron,
    /// 固定速率，调度配置为毫秒数
    #[serde(rename = "FIX_RATE")]
    FixRate,
}

string_enum!(ScheduleType {
    None => "NONE",
    Cron => "CRON",
    FixRate => "FIX_RATE",
});

/// 调度过期策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MisfireStrategy {
    #[serde(rename = "DO_NOTHING")]
    DoNothing,
    #[serde(rename = "FIRE_ONCE_NOW")]
    FireOnceNow,
}

string_enum!(MisfireStrategy {
    DoNothing => "DO_NOTHING",
    FireOnceNow => "FIRE_ONCE_NOW",
});

/// 执行器路由策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteStrategy {
    #[serde(rename = "FIRST")]
    First,
    #[serde(rename = "LAST")]
    Last,
    #[serde(rename = "ROUND")]
    Round,
    #[serde(rename = "RANDOM")]
    Random,
    #[serde(rename = "CONSISTENT_HASH")]
    ConsistentHash,
    #[serde(rename = "LEAST_FREQUENTLY_USED")]
    LeastFrequentlyUsed,
    #[serde(rename = "LEAST_RECENTLY_USED")]
    LeastRecentlyUsed,
    #[serde(rename = "FAILOVER")]
    Failover,
    #[serde(rename = "BUSYOVER")]
    BusyOver,
    #[serde(rename = "SHARDING_BROADCAST")]
    ShardingBroadcast,
}

string_enum!(RouteStrategy {
    First => "FIRST",
    Last => "LAST",
    Round => "ROUND",
    Random => "RANDOM",
    ConsistentHash => "CONSISTENT_HASH",
    LeastFrequentlyUsed => "LEAST_FREQUENTLY_USED",
    LeastRecentlyUsed => "LEAST_RECENTLY_USED",
    Failover => "FAILOVER",
    BusyOver => "BUSYOVER",
    ShardingBroadcast => "SHARDING_BROADCAST",
});

/// 阻塞处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockStrategy {
    #[default]
    #[serde(rename = "SERIAL_EXECUTION")]
    SerialExecution,
    #[serde(rename = "DISCARD_LATER")]
    DiscardLater,
    #[serde(rename = "COVER_EARLY")]
    CoverEarly,
}

string_enum!(BlockStrategy {
    SerialExecution => "SERIAL_EXECUTION",
    DiscardLater => "DISCARD_LATER",
    CoverEarly => "COVER_EARLY",
});

/// 任务代码来源
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlueType {
    #[default]
    #[serde(rename = "BEAN")]
    Bean,
    #[serde(rename = "GLUE_GROOVY")]
    GlueGroovy,
    #[serde(rename = "GLUE_SHELL")]
    GlueShell,
    #[serde(rename = "GLUE_PYTHON")]
    GluePython,
}

string_enum!(GlueType {
    Bean => "BEAN",
    GlueGroovy => "GLUE_GROOVY",
    GlueShell => "GLUE_SHELL",
    GluePython => "GLUE_PYTHON",
});

/// 触发类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerType {
    #[serde(rename = "MANUAL")]
    Manual,
    #[serde(rename = "CRON")]
    Cron,
    #[serde(rename = "RETRY")]
    Retry,
    #[serde(rename = "PARENT")]
    Parent,
    #[serde(rename = "API")]
    Api,
    #[serde(rename = "MISFIRE")]
    Misfire,
}

string_enum!(TriggerType {
    Manual => "MANUAL",
    Cron => "CRON",
    Retry => "RETRY",
    Parent => "PARENT",
    Api => "API",
    Misfire => "MISFIRE",
});

/// 调度状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerStatus {
    #[default]
    Stopped,
    Running,
}

impl TriggerStatus {
    pub fn as_i32(&self) -> i32 {
        match self {
            TriggerStatus::Stopped => 0,
            TriggerStatus::Running => 1,
        }
    }

    pub fn from_i32(value: i32) -> Self {
        if value == 1 {
            TriggerStatus::Running
        } else {
            TriggerStatus::Stopped
        }
    }
}

/// 执行器地址类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressType {
    /// 由注册中心自动维护
    #[default]
    Auto,
    /// 人工录入，注册监控不会覆盖
    Manual,
}

impl AddressType {
    pub fn as_i32(&self) -> i32 {
        match self {
            AddressType::Auto => 0,
            AddressType::Manual => 1,
        }
    }

    pub fn from_i32(value: i32) -> Self {
        if value == 1 {
            AddressType::Manual
        } else {
            AddressType::Auto
        }
    }
}

/// 任务定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: i64,
    pub job_group: i64,
    pub job_desc: String,
    pub schedule_type: ScheduleType,
    pub schedule_conf: String,
    pub misfire_strategy: MisfireStrategy,
    pub executor_route_strategy: RouteStrategy,
    pub executor_handler: String,
    pub executor_param: String,
    pub executor_block_strategy: BlockStrategy,
    /// 单位秒
    pub executor_timeout: i32,
    pub executor_fail_retry_count: i32,
    pub glue_type: GlueType,
    pub glue_source: String,
    /// 毫秒时间戳
    pub glue_updatetime: i64,
    pub trigger_status: TriggerStatus,
    /// 毫秒时间戳
    pub trigger_last_time: i64,
    /// 毫秒时间戳
    pub trigger_next_time: i64,
}

impl JobInfo {
    pub fn new<S: Into<String>>(job_group: i64, executor_handler: S) -> Self {
        Self {
            id: 0,
            job_group,
            job_desc: String::new(),
            schedule_type: ScheduleType::None,
            schedule_conf: String::new(),
            misfire_strategy: MisfireStrategy::DoNothing,
            executor_route_strategy: RouteStrategy::First,
            executor_handler: executor_handler.into(),
            executor_param: String::new(),
            executor_block_strategy: BlockStrategy::SerialExecution,
            executor_timeout: 0,
            executor_fail_retry_count: 0,
            glue_type: GlueType::Bean,
            glue_source: String::new(),
            glue_updatetime: 0,
            trigger_status: TriggerStatus::Stopped,
            trigger_last_time: 0,
            trigger_next_time: 0,
        }
    }

    pub fn with_cron<S: Into<String>>(mut self, expr: S) -> Self {
        self.schedule_type = ScheduleType::Cron;
        self.schedule_conf = expr.into();
        self
    }

    pub fn with_fix_rate(mut self, interval_ms: i64) -> Self {
        self.schedule_type = ScheduleType::FixRate;
        self.schedule_conf = interval_ms.to_string();
        self
    }

    pub fn with_route_strategy(mut self, strategy: RouteStrategy) -> Self {
        self.executor_route_strategy = strategy;
        self
    }

    pub fn with_misfire_strategy(mut self, strategy: MisfireStrategy) -> Self {
        self.misfire_strategy = strategy;
        self
    }

    pub fn with_param<S: Into<String>>(mut self, param: S) -> Self {
        self.executor_param = param.into();
        self
    }

    /// 设置为运行状态并指定下次触发时间
    pub fn running_at(mut self, next_trigger_time: i64) -> Self {
        self.trigger_status = TriggerStatus::Running;
        self.trigger_next_time = next_trigger_time;
        self
    }

    pub fn is_running(&self) -> bool {
        self.trigger_status == TriggerStatus::Running
    }

    /// 停止调度并清空触发时间
    pub fn stop(&mut self) {
        self.trigger_status = TriggerStatus::Stopped;
        self.trigger_last_time = 0;
        self.trigger_next_time = 0;
    }
}

/// 执行器分组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobGroup {
    pub id: i64,
    pub app_name: String,
    pub title: String,
    pub address_type: AddressType,
    /// 逗号分隔的执行器地址
    pub address_list: String,
}

impl JobGroup {
    pub fn new<A: Into<String>>(app_name: A, address_type: AddressType) -> Self {
        let app_name = app_name.into();
        Self {
            id: 0,
            title: app_name.clone(),
            app_name,
            address_type,
            address_list: String::new(),
        }
    }

    pub fn with_addresses(mut self, addresses: &[&str]) -> Self {
        self.address_list = addresses.join(",");
        self
    }

    pub fn addresses(&self) -> Vec<String> {
        self.address_list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// 执行器注册记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRegistry {
    pub id: i64,
    pub registry_group: String,
    pub registry_key: String,
    pub registry_value: String,
    pub update_time: DateTime<Utc>,
}

/// 调度日志
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLog {
    pub id: i64,
    pub job_group: i64,
    pub job_id: i64,
    pub executor_address: String,
    pub executor_handler: String,
    pub executor_param: String,
    pub executor_sharding_param: String,
    pub executor_fail_retry_count: i32,
    pub trigger_time: DateTime<Utc>,
    pub trigger_code: i32,
    pub trigger_msg: String,
    pub handle_time: Option<DateTime<Utc>>,
    pub handle_code: i32,
    pub handle_msg: String,
}

impl JobLog {
    pub fn new(job_group: i64, job_id: i64, trigger_time: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            job_group,
            job_id,
            executor_address: String::new(),
            executor_handler: String::new(),
            executor_param: String::new(),
            executor_sharding_param: String::new(),
            executor_fail_retry_count: 0,
            trigger_time,
            trigger_code: 0,
            trigger_msg: String::new(),
            handle_time: None,
            handle_code: 0,
            handle_msg: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_strategy_names() {
        assert_eq!(RouteStrategy::BusyOver.as_str(), "BUSYOVER");
        assert_eq!(
            "SHARDING_BROADCAST".parse::<RouteStrategy>().unwrap(),
            RouteStrategy::ShardingBroadcast
        );
        assert!("ROUND_ROBIN".parse::<RouteStrategy>().is_err());
        for strategy in RouteStrategy::ALL {
            assert_eq!(strategy.as_str().parse::<RouteStrategy>().unwrap(), *strategy);
        }
    }

    #[test]
    fn test_serde_matches_persisted_names() {
        let json = serde_json::to_string(&ScheduleType::FixRate).unwrap();
        assert_eq!(json, "\"FIX_RATE\"");
        let strategy: BlockStrategy = serde_json::from_str("\"COVER_EARLY\"").unwrap();
        assert_eq!(strategy, BlockStrategy::CoverEarly);
    }

    #[test]
    fn test_group_addresses_skip_blanks() {
        let group = JobGroup {
            address_list: "http://a:1/, ,http://b:2/,".to_string(),
            ..JobGroup::new("app", AddressType::Manual)
        };
        assert_eq!(group.addresses(), vec!["http://a:1/", "http://b:2/"]);
        assert!(JobGroup::new("app", AddressType::Auto).addresses().is_empty());
    }

    #[test]
    fn test_job_stop_clears_times() {
        let mut job = JobInfo::new(1, "demo").with_cron("0/5 * * * * ?").running_at(1000);
        job.trigger_last_time = 500;
        job.stop();
        assert!(!job.is_running());
        assert_eq!(job.trigger_next_time, 0);
        assert_eq!(job.trigger_last_time, 0);
    }
}
