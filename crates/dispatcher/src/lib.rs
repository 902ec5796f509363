//! 调度中心核心
//!
//! 扫描循环负责推进下次触发时间并把临近的触发交给时间轮，
//! 触发器负责路由、记录调度日志并异步调用执行器。

pub mod controller;
pub mod cron_utils;
pub mod registry_monitor;
pub mod router;
pub mod scheduler;
pub mod time_wheel;
pub mod trigger;

pub use controller::JobController;
pub use registry_monitor::{RegistryMonitor, RegistryMonitorConfig};
pub use router::ExecutorRouter;
pub use scheduler::{JobScheduler, ScheduleConfig};
pub use time_wheel::{TimeWheel, WheelTaskHandler};
pub use trigger::{JobTrigger, TriggerCommand, TriggerRequest};
