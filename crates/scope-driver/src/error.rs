//! 驱动层错误类型定义

use std::time::Duration;
use thiserror::Error;

/// 配置校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// 采样周期必须在 (0, 60 s] 内
    #[error("Invalid poller period: {period:?} (must be > 0 and <= 60s)")]
    InvalidPeriod { period: Duration },

    /// 队列容量必须大于 0
    #[error("Invalid poller buffer size: {size} (must be > 0)")]
    InvalidBufferSize { size: usize },

    /// 刷新率必须大于 0
    #[error("Invalid pump rate: {rate_hz} Hz (must be > 0)")]
    InvalidRate { rate_hz: u32 },

    /// 显示窗口长度必须大于 0
    #[error("Invalid sample count: {count} (must be > 0)")]
    InvalidSampleCount { count: usize },

    /// 连续失败阈值必须大于 0
    #[error("Invalid failure threshold: {threshold} (must be > 0)")]
    InvalidFailureThreshold { threshold: u32 },

    /// 运动范围必须是有限值
    #[error("Invalid {name}: must be a finite number")]
    InvalidRange { name: &'static str },

    /// 超时超出允许范围
    #[error("Invalid {name}: {timeout_ms} ms (must be > 0 and <= {max_ms} ms)")]
    InvalidTimeout {
        name: &'static str,
        timeout_ms: u64,
        max_ms: u64,
    },
}

/// 驱动层错误
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// 已有采样线程在运行
    #[error("Poller already running")]
    AlreadyRunning,

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}
