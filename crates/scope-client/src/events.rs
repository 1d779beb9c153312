//! 后台线程发往状态机的事件
//!
//! 回零线程和采样线程从不直接调用状态机代码，只向同一个通道发送事件，
//! 由持有 `Supervisor` 的线程在 `process_events()` / `wait_event()` 中消费。

use crate::homing::HomingOutcome;
use scope_driver::PollerFault;

/// 状态机事件
///
/// 每个事件都带有产生它的运行编号，状态机据此丢弃过期事件。
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    /// 回零线程结束
    HomingFinished { run_id: u64, outcome: HomingOutcome },
    /// 采样线程连续读取失败后退出
    TelemetryFault { run_id: u64, fault: PollerFault },
}

impl SupervisorEvent {
    pub fn run_id(&self) -> u64 {
        match self {
            SupervisorEvent::HomingFinished { run_id, .. } => *run_id,
            SupervisorEvent::TelemetryFault { run_id, .. } => *run_id,
        }
    }
}
