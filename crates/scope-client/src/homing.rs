//! 回零线程
//!
//! 回零是设备驱动的长耗时阻塞流程（默认超时 150 s），在独立线程中执行，
//! 命令处理线程不会被阻塞。
//!
//! # 设计
//!
//! - **失能守卫**：线程的每条退出路径（成功、失败、超时、panic）都会失能设备一次
//! - **结果只投递一次**：结果通过状态机的事件通道发送，带运行编号；
//!   线程 panic 时由完成守卫补发 `Failed`
//! - 失能先于结果投递，状态机收到结果时设备已经失能

use crate::error::{HomingError, SupervisorError};
use crate::events::SupervisorEvent;
use crossbeam_channel::Sender;
use scope_device::{Device, DeviceError, SharedDevice};
use scope_driver::DriverError;
use scope_protocol::OperationMode;
use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// 回零结果
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HomingOutcome {
    Succeeded,
    Failed(String),
}

impl HomingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, HomingOutcome::Succeeded)
    }

    /// 显示文本："Finished" 或 "Error: <原因>"
    pub fn status_text(&self) -> String {
        match self {
            HomingOutcome::Succeeded => "Finished".to_string(),
            HomingOutcome::Failed(reason) => format!("Error: {}", reason),
        }
    }
}

impl fmt::Display for HomingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HomingOutcome::Succeeded => f.write_str("succeeded"),
            HomingOutcome::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// 回零线程句柄
pub struct HomingWorker {
    run_id: u64,
    handle: Option<JoinHandle<()>>,
}

impl HomingWorker {
    /// 启动回零线程
    ///
    /// 结果以 `SupervisorEvent::HomingFinished { run_id, .. }` 的形式发送到 `events`。
    pub fn spawn(
        axis: SharedDevice,
        timeout: Duration,
        events: Sender<SupervisorEvent>,
        run_id: u64,
    ) -> Result<Self, SupervisorError> {
        let handle = thread::Builder::new()
            .name(format!("scope-homing-{}", run_id))
            .spawn(move || homing_main(axis, timeout, events, run_id))
            .map_err(|e| SupervisorError::Driver(DriverError::ThreadSpawn(e)))?;

        Ok(Self {
            run_id,
            handle: Some(handle),
        })
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// 线程是否已退出
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// 等待线程退出
    pub fn join(mut self) -> Result<(), SupervisorError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| SupervisorError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

/// 失能守卫：离开作用域时失能设备
struct DisableGuard<'a> {
    axis: &'a dyn Device,
}

impl Drop for DisableGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.axis.disable() {
            warn!("Failed to disable axis after homing: {}", e);
        }
    }
}

/// 完成守卫：保证结果恰好发送一次
struct Completion {
    events: Sender<SupervisorEvent>,
    run_id: u64,
    sent: bool,
}

impl Completion {
    fn send(&mut self, outcome: HomingOutcome) {
        self.sent = true;
        let event = SupervisorEvent::HomingFinished {
            run_id: self.run_id,
            outcome,
        };
        if self.events.send(event).is_err() {
            warn!("Homing run {} finished but supervisor is gone", self.run_id);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.sent {
            error!("Homing run {} aborted by panic", self.run_id);
            self.send(HomingOutcome::Failed("homing worker panicked".to_string()));
        }
    }
}

fn homing_main(axis: SharedDevice, timeout: Duration, events: Sender<SupervisorEvent>, run_id: u64) {
    let mut completion = Completion {
        events,
        run_id,
        sent: false,
    };

    info!("Homing run {} started (timeout {:?})", run_id, timeout);
    let started = Instant::now();

    let outcome = {
        let _guard = DisableGuard { axis: &*axis };
        match run_homing(&*axis, timeout) {
            Ok(()) => HomingOutcome::Succeeded,
            Err(e) => HomingOutcome::Failed(e.to_string()),
        }
    };

    info!(
        "Homing run {} {} after {:?}",
        run_id,
        outcome,
        started.elapsed()
    );
    completion.send(outcome);
}

fn run_homing(axis: &dyn Device, timeout: Duration) -> Result<(), HomingError> {
    axis.set_mode(OperationMode::Homing).map_err(HomingError::Setup)?;
    axis.enable().map_err(HomingError::Setup)?;

    axis.homing_start().map_err(HomingError::Device)?;
    match axis.homing_wait(timeout) {
        Ok(()) => Ok(()),
        Err(DeviceError::Timeout { .. }) => Err(HomingError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
        Err(e) => Err(HomingError::Device(e)),
    }
}
