//! 轴状态机
//!
//! - `transition`: 纯函数状态转移表
//! - `machine`: 持有设备、遥测与回零线程的 `Supervisor`

mod machine;
pub mod transition;

pub use machine::{HOMING_RUNNING_TEXT, Supervisor};
pub use transition::{Command, allowed_commands, transition};
