//! 监控配置（TOML）
//!
//! 所有字段都有默认值，配置文件只需写出要覆盖的部分：
//!
//! ```toml
//! [poller]
//! period_ms = 10
//! buffer_size = 100
//! max_consecutive_failures = 5
//!
//! [telemetry]
//! fps = 30
//! n_samples = 1000
//!
//! [motion]
//! position_range_deg = 360.0
//! velocity_range_rps = 40.0
//! homing_timeout_ms = 150000
//! axis_timeout_ms = 100
//! ```

use crate::error::SupervisorError;
use scope_driver::{ConfigError, PollerConfig, PumpConfig, PumpMode};
use scope_protocol::Channel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 显示范围外扩的余量
pub const DISPLAY_MARGIN: f64 = 10.0;

/// 回零超时上限（1 小时）
pub const MAX_HOMING_TIMEOUT_MS: u64 = 3_600_000;

/// 轮询配置段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSection {
    pub period_ms: u64,
    pub buffer_size: usize,
    pub max_consecutive_failures: u32,
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            period_ms: 10,
            buffer_size: 100,
            max_consecutive_failures: 5,
        }
    }
}

/// 遥测显示配置段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    /// 显示刷新率
    pub fps: u32,
    /// 显示窗口长度
    pub n_samples: usize,
    /// 为 true 时不创建泵线程，由命令处理线程驱动
    pub cooperative: bool,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            fps: 30,
            n_samples: 1000,
            cooperative: false,
        }
    }
}

/// 运动配置段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSection {
    pub position_range_deg: f64,
    pub velocity_range_rps: f64,
    pub homing_timeout_ms: u64,
    /// 单次设备访问超时，交给设备实现使用
    pub axis_timeout_ms: u64,
}

impl Default for MotionSection {
    fn default() -> Self {
        Self {
            position_range_deg: 360.0,
            velocity_range_rps: 40.0,
            homing_timeout_ms: 150_000,
            axis_timeout_ms: 100,
        }
    }
}

impl MotionSection {
    fn validate(&self) -> Result<(), ConfigError> {
        // TOML 允许 nan / inf，限幅时会 panic
        if !self.position_range_deg.is_finite() {
            return Err(ConfigError::InvalidRange {
                name: "position_range_deg",
            });
        }
        if !self.velocity_range_rps.is_finite() {
            return Err(ConfigError::InvalidRange {
                name: "velocity_range_rps",
            });
        }
        if self.homing_timeout_ms == 0 || self.homing_timeout_ms > MAX_HOMING_TIMEOUT_MS {
            return Err(ConfigError::InvalidTimeout {
                name: "homing_timeout_ms",
                timeout_ms: self.homing_timeout_ms,
                max_ms: MAX_HOMING_TIMEOUT_MS,
            });
        }
        Ok(())
    }
}

/// 完整配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub poller: PollerSection,
    pub telemetry: TelemetrySection,
    pub motion: MotionSection,
}

impl ScopeConfig {
    /// 从文件加载并校验
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, SupervisorError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SupervisorError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, SupervisorError> {
        let config: ScopeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, SupervisorError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 保存到文件
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), SupervisorError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        fs::write(path, content).map_err(|source| SupervisorError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.poller_config().validate()?;
        self.pump_config().validate()?;
        self.motion.validate()
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            period: Duration::from_millis(self.poller.period_ms),
            buffer_size: self.poller.buffer_size,
            max_consecutive_failures: self.poller.max_consecutive_failures,
        }
    }

    pub fn pump_config(&self) -> PumpConfig {
        PumpConfig {
            rate_hz: self.telemetry.fps,
            n_samples: self.telemetry.n_samples,
            mode: if self.telemetry.cooperative {
                PumpMode::Cooperative
            } else {
                PumpMode::Threaded
            },
        }
    }

    pub fn homing_timeout(&self) -> Duration {
        Duration::from_millis(self.motion.homing_timeout_ms)
    }

    pub fn axis_timeout(&self) -> Duration {
        Duration::from_millis(self.motion.axis_timeout_ms)
    }

    pub fn ranges(&self) -> MotionRanges {
        MotionRanges {
            position_deg: self.motion.position_range_deg.abs(),
            velocity_rps: self.motion.velocity_range_rps.abs(),
        }
    }
}

/// 目标值范围（对称区间）
///
/// 只供调用方做输入限幅和显示缩放，状态机本身不限幅。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionRanges {
    pub position_deg: f64,
    pub velocity_rps: f64,
}

impl MotionRanges {
    pub fn clamp_position(&self, value: f64) -> f64 {
        value.clamp(-self.position_deg, self.position_deg)
    }

    pub fn clamp_velocity(&self, value: f64) -> f64 {
        value.clamp(-self.velocity_rps, self.velocity_rps)
    }

    /// 显示纵轴范围：±(range + 10)
    pub fn display_range(&self, channel: Channel) -> (f64, f64) {
        let range = match channel {
            Channel::Position => self.position_deg,
            Channel::Velocity => self.velocity_rps,
        } + DISPLAY_MARGIN;
        (-range, range)
    }
}
