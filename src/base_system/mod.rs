//! 配置、日志等基础设施。

pub mod config;
pub mod context;
pub mod logging;
