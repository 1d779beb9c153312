//! 运行模式
//!
//! 支持两种模式：
//! - Shell 模式：交互式命令
//! - Demo 模式：脚本化演示

pub mod demo;
pub mod shell;
