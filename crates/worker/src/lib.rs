//! 执行器
//!
//! 接收调度中心的 `/run`、`/kill`、`/beat`、`/idleBeat`、`/log` 调用，按任务维护分发循环执行
//! 已注册的处理器，并定期向调度中心注册、上报执行结果。

pub mod components;
pub mod executor_biz;
pub mod executors;
pub mod handler;
pub mod runtime;
pub mod server;
pub mod service;

pub use components::{CallbackReporter, HttpAdminClient, RegistryHeartbeat};
pub use executor_biz::ExecutorBiz;
pub use executors::{CommandJobHandler, DemoJobHandler, HttpJobHandler};
pub use handler::{HandlerRegistry, JobContext, JobHandler};
pub use runtime::JobRuntime;
pub use server::{create_router, ServerState};
pub use service::{ExecutorService, ExecutorServiceBuilder};
