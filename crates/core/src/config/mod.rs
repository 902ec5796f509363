//! 配置管理
//!
//! 配置对象在启动时构建一次，并以引用或 `Arc` 的形式传入各组件的构造函数。

pub mod models;

pub use models::*;
