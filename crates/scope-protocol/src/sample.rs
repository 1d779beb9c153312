//! 采样点与遥测通道

use crate::registers::{POS_ACTUAL, Register, VEL_ACTUAL};
use crate::state::AxisState;
use std::fmt;

/// 遥测采样点
///
/// - `time`: 相对采集开始的时间（秒）
/// - `value`: 采样值，单位由通道决定（位置：deg，速度：rps）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// 时间（秒）
    pub time: f64,
    /// 采样值
    pub value: f64,
}

impl Sample {
    /// 创建采样点
    pub const fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

impl From<(f64, f64)> for Sample {
    fn from((time, value): (f64, f64)) -> Self {
        Self::new(time, value)
    }
}

/// 遥测通道
///
/// 决定轮询哪个寄存器，以及显示时使用的标签和单位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    /// 实际位置（deg）
    Position,
    /// 实际速度（rps）
    Velocity,
}

impl Channel {
    /// 该通道轮询的寄存器
    pub fn register(self) -> Register {
        match self {
            Channel::Position => POS_ACTUAL,
            Channel::Velocity => VEL_ACTUAL,
        }
    }

    /// 显示标签
    pub fn label(self) -> &'static str {
        match self {
            Channel::Position => "Position",
            Channel::Velocity => "Velocity",
        }
    }

    /// 显示单位
    pub fn unit(self) -> &'static str {
        match self {
            Channel::Position => "deg",
            Channel::Velocity => "rps",
        }
    }

    /// 该通道对应的控制状态
    pub fn control_state(self) -> AxisState {
        match self {
            Channel::Position => AxisState::PositionControl,
            Channel::Velocity => AxisState::VelocityControl,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.unit())
    }
}
