//! 共享库
//!
//! 包含配置加载和日志初始化等基础设施代码。

pub mod config;
pub mod observability;
