//! 状态转移表
//!
//! | 状态 | request_homing | toggle_pc | toggle_vc | homing_complete |
//! |---|---|---|---|---|
//! | Idle | Homing | PositionControl | VelocityControl | — |
//! | Homing | — | — | — | Idle |
//! | PositionControl | — | Idle | — | — |
//! | VelocityControl | — | — | Idle | — |
//!
//! 目标设定命令只在对应的控制状态下合法，且不改变状态。

use scope_protocol::AxisState;
use std::fmt;

/// 状态机命令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    RequestHoming,
    HomingComplete,
    TogglePositionControl,
    ToggleVelocityControl,
    SetPositionTarget,
    SetVelocityTarget,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::RequestHoming,
        Command::HomingComplete,
        Command::TogglePositionControl,
        Command::ToggleVelocityControl,
        Command::SetPositionTarget,
        Command::SetVelocityTarget,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::RequestHoming => "request_homing",
            Command::HomingComplete => "homing_complete",
            Command::TogglePositionControl => "toggle_position_control",
            Command::ToggleVelocityControl => "toggle_velocity_control",
            Command::SetPositionTarget => "set_position_target",
            Command::SetVelocityTarget => "set_velocity_target",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 查表：返回命令执行后的状态，非法时返回 `None`
pub fn transition(state: AxisState, command: Command) -> Option<AxisState> {
    use AxisState::*;
    use Command::*;

    match (state, command) {
        (Idle, RequestHoming) => Some(Homing),
        (Idle, TogglePositionControl) => Some(PositionControl),
        (Idle, ToggleVelocityControl) => Some(VelocityControl),
        (Homing, HomingComplete) => Some(Idle),
        (PositionControl, TogglePositionControl) => Some(Idle),
        (PositionControl, SetPositionTarget) => Some(PositionControl),
        (VelocityControl, ToggleVelocityControl) => Some(Idle),
        (VelocityControl, SetVelocityTarget) => Some(VelocityControl),
        _ => None,
    }
}

/// 当前状态下合法的命令
pub fn allowed_commands(state: AxisState) -> Vec<Command> {
    Command::ALL
        .into_iter()
        .filter(|command| transition(state, *command).is_some())
        .collect()
}
