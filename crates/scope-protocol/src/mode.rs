//! 运行模式与单位定义
//!
//! 运行模式编码沿用 CiA 402 的 "Modes of operation"（0x6060）取值。

use crate::ProtocolError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::f64::consts::TAU;
use std::fmt;

/// 驱动器运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i8)]
pub enum OperationMode {
    /// 轮廓位置模式（Profile Position, PP）
    ProfilePosition = 1,
    /// 轮廓速度模式（Profile Velocity, PV）
    ProfileVelocity = 3,
    /// 回零模式（Homing, HM）
    Homing = 6,
}

impl OperationMode {
    /// 从 0x6060 编码转换
    ///
    /// # 错误
    ///
    /// 编码不在支持范围内时返回 `ProtocolError::InvalidOperationMode`。
    pub fn from_code(code: i8) -> Result<Self, ProtocolError> {
        Self::try_from(code).map_err(|_| ProtocolError::InvalidOperationMode { code })
    }

    /// 转换为 0x6060 编码
    pub fn code(self) -> i8 {
        self.into()
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationMode::ProfilePosition => "profile position",
            OperationMode::ProfileVelocity => "profile velocity",
            OperationMode::Homing => "homing",
        };
        f.write_str(name)
    }
}

/// 位置单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PositionUnits {
    /// 度
    #[default]
    Degrees = 0,
    /// 弧度
    Radians = 1,
    /// 圈
    Revolutions = 2,
}

impl PositionUnits {
    /// 从编码转换
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Self::try_from(code).map_err(|_| ProtocolError::InvalidPositionUnits { code })
    }

    /// 将以度表示的位置换算为本单位
    pub fn from_degrees(self, degrees: f64) -> f64 {
        match self {
            PositionUnits::Degrees => degrees,
            PositionUnits::Radians => degrees.to_radians(),
            PositionUnits::Revolutions => degrees / 360.0,
        }
    }

    /// 将本单位的位置换算为度
    pub fn to_degrees(self, value: f64) -> f64 {
        match self {
            PositionUnits::Degrees => value,
            PositionUnits::Radians => value.to_degrees(),
            PositionUnits::Revolutions => value * 360.0,
        }
    }

    /// 单位符号
    pub fn suffix(self) -> &'static str {
        match self {
            PositionUnits::Degrees => "deg",
            PositionUnits::Radians => "rad",
            PositionUnits::Revolutions => "rev",
        }
    }
}

/// 速度单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum VelocityUnits {
    /// 转/秒
    #[default]
    RevolutionsPerSecond = 0,
    /// 转/分
    RevolutionsPerMinute = 1,
    /// 度/秒
    DegreesPerSecond = 2,
    /// 弧度/秒
    RadiansPerSecond = 3,
}

impl VelocityUnits {
    /// 从编码转换
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Self::try_from(code).map_err(|_| ProtocolError::InvalidVelocityUnits { code })
    }

    /// 将以 rps 表示的速度换算为本单位
    pub fn from_rps(self, rps: f64) -> f64 {
        match self {
            VelocityUnits::RevolutionsPerSecond => rps,
            VelocityUnits::RevolutionsPerMinute => rps * 60.0,
            VelocityUnits::DegreesPerSecond => rps * 360.0,
            VelocityUnits::RadiansPerSecond => rps * TAU,
        }
    }

    /// 将本单位的速度换算为 rps
    pub fn to_rps(self, value: f64) -> f64 {
        match self {
            VelocityUnits::RevolutionsPerSecond => value,
            VelocityUnits::RevolutionsPerMinute => value / 60.0,
            VelocityUnits::DegreesPerSecond => value / 360.0,
            VelocityUnits::RadiansPerSecond => value / TAU,
        }
    }

    /// 单位符号
    pub fn suffix(self) -> &'static str {
        match self {
            VelocityUnits::RevolutionsPerSecond => "rps",
            VelocityUnits::RevolutionsPerMinute => "rpm",
            VelocityUnits::DegreesPerSecond => "deg/s",
            VelocityUnits::RadiansPerSecond => "rad/s",
        }
    }
}
