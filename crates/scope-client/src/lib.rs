//! 客户端接口模块
//!
//! 本模块提供单轴伺服监控的用户接口，包括：
//! - 状态机（Idle / Homing / PositionControl / VelocityControl）
//! - 后台回零线程与结果投递
//! - 位置 / 速度遥测的启动与停止
//! - TOML 配置
//!
//! # 使用场景
//!
//! 这是大多数用户应该使用的模块。设备由调用方实现 [`scope_device::Device`] 提供，
//! 显示端实现 [`scope_driver::DisplaySink`]。

pub mod config;
mod error;
pub mod events;
pub mod homing;
pub mod state;

// 重新导出常用类型
pub use config::{MotionRanges, ScopeConfig};
pub use error::{HomingError, SupervisorError};
pub use events::SupervisorEvent;
pub use homing::{HomingOutcome, HomingWorker};
pub use state::{Command, Supervisor};
