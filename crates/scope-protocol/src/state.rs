//! 轴状态定义

use crate::sample::Channel;
use std::fmt;

/// 轴状态
///
/// ```text
/// Init ──▶ Idle ──▶ { Homing, PositionControl, VelocityControl } ──▶ Idle
/// ```
///
/// `Init` 只在构造时短暂出现一次，随即被 `Idle` 取代。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AxisState {
    /// 初始化（瞬态）
    #[default]
    Init,
    /// 空闲：接受回零、位置控制、速度控制请求
    Idle,
    /// 回零进行中
    Homing,
    /// 位置控制（遥测通道：位置）
    PositionControl,
    /// 速度控制（遥测通道：速度）
    VelocityControl,
}

impl AxisState {
    /// 当前状态对应的遥测通道
    ///
    /// 仅在 `PositionControl` / `VelocityControl` 下有定义。
    pub fn channel(self) -> Option<Channel> {
        match self {
            AxisState::PositionControl => Some(Channel::Position),
            AxisState::VelocityControl => Some(Channel::Velocity),
            _ => None,
        }
    }

    /// 是否处于产生遥测的状态
    pub fn is_streaming(self) -> bool {
        self.channel().is_some()
    }
}

impl fmt::Display for AxisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AxisState::Init => "Init",
            AxisState::Idle => "Idle",
            AxisState::Homing => "Homing",
            AxisState::PositionControl => "PositionControl",
            AxisState::VelocityControl => "VelocityControl",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_channel() {
        assert_eq!(AxisState::PositionControl.channel(), Some(Channel::Position));
        assert_eq!(AxisState::VelocityControl.channel(), Some(Channel::Velocity));
        assert_eq!(AxisState::Idle.channel(), None);
        assert_eq!(AxisState::Homing.channel(), None);
        assert!(!AxisState::Init.is_streaming());
        assert!(AxisState::VelocityControl.is_streaming());
    }

    #[test]
    fn test_state_default_and_display() {
        assert_eq!(AxisState::default(), AxisState::Init);
        assert_eq!(AxisState::PositionControl.to_string(), "PositionControl");
    }
}
