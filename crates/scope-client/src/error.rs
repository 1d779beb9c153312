//! 状态机层错误类型定义

use crate::state::Command;
use scope_device::DeviceError;
use scope_driver::{ConfigError, DriverError};
use scope_protocol::AxisState;
use std::path::PathBuf;
use thiserror::Error;

/// 状态机错误
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// 当前状态不接受该命令（无副作用）
    #[error("Command '{command}' is not allowed in state {state}")]
    IllegalCommand { command: Command, state: AxisState },

    /// 已交出结果的回零线程仍在使用设备（无副作用）
    #[error("Command '{command}' rejected: a previous homing run is still using the device")]
    HomingWorkerBusy { command: Command },

    /// 设备通信失败
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// 配置非法
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// 遥测线程启动失败
    #[error("Telemetry error: {0}")]
    Driver(#[from] DriverError),

    /// 配置文件读写失败
    #[error("Failed to access config file {path:?}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 配置文件解析失败
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// 配置序列化失败
    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// 后台线程 panic
    #[error("Worker thread panicked")]
    WorkerPanicked,
}

impl SupervisorError {
    /// 是否为非法命令（调用方可安全忽略，状态未变）
    pub fn is_illegal_command(&self) -> bool {
        matches!(self, SupervisorError::IllegalCommand { .. })
    }
}

/// 回零过程错误
///
/// 只会以 `HomingOutcome::Failed(err.to_string())` 的形式出现在结果通道中。
#[derive(Error, Debug)]
pub enum HomingError {
    /// 设置回零模式或使能失败，未开始等待
    #[error("Homing setup failed: {0}")]
    Setup(#[source] DeviceError),

    /// 等待超时
    #[error("Homing timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// 回零过程中设备报错
    #[error("Homing failed: {0}")]
    Device(#[source] DeviceError),
}
