//! Cadence 工具集
//!
//! 提供日志初始化与性能分析作用域等通用工具。

pub mod init_log;
pub mod profile;

#[doc(hidden)]
pub use tracy_client;
