//! Mock 设备（仅测试 / `mock` feature）
//!
//! 记录每一次调用（含调用线程），支持按操作注入失败、设置寄存器值、
//! 以及脚本化回零行为，供上层状态机与遥测线程测试使用。
//!
//! # 示例
//!
//! ```ignore
//! use scope_device::{Device, DeviceOp, MockDevice};
//! use scope_protocol::POS_ACTUAL;
//!
//! let device = MockDevice::new();
//! device.set_register_value(&POS_ACTUAL, 12.5);
//! assert_eq!(device.read_register(&POS_ACTUAL).unwrap(), 12.5);
//!
//! device.fail_on(DeviceOp::Enable);
//! assert!(device.enable().is_err());
//! assert_eq!(device.count(DeviceOp::Enable), 1);
//! ```

use crate::{CommunicationErrorKind, Device, DeviceError};
use parking_lot::{Condvar, Mutex};
use scope_protocol::{OperationMode, PositionUnits, Register, VelocityUnits};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// 设备操作类别（用于失败注入与计数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceOp {
    SetMode,
    Enable,
    Disable,
    SetPositionUnits,
    SetVelocityUnits,
    SetPositionTarget,
    SetVelocityTarget,
    ReadRegister,
    HomingStart,
    HomingWait,
}

/// 一次设备调用（含参数）
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    SetMode(OperationMode),
    Enable,
    Disable,
    SetPositionUnits(PositionUnits),
    SetVelocityUnits(VelocityUnits),
    SetPositionTarget(f64),
    SetVelocityTarget(f64),
    ReadRegister(Register),
    HomingStart,
    HomingWait(Duration),
}

impl DeviceCall {
    pub fn op(&self) -> DeviceOp {
        match self {
            DeviceCall::SetMode(_) => DeviceOp::SetMode,
            DeviceCall::Enable => DeviceOp::Enable,
            DeviceCall::Disable => DeviceOp::Disable,
            DeviceCall::SetPositionUnits(_) => DeviceOp::SetPositionUnits,
            DeviceCall::SetVelocityUnits(_) => DeviceOp::SetVelocityUnits,
            DeviceCall::SetPositionTarget(_) => DeviceOp::SetPositionTarget,
            DeviceCall::SetVelocityTarget(_) => DeviceOp::SetVelocityTarget,
            DeviceCall::ReadRegister(_) => DeviceOp::ReadRegister,
            DeviceCall::HomingStart => DeviceOp::HomingStart,
            DeviceCall::HomingWait(_) => DeviceOp::HomingWait,
        }
    }
}

/// 调用记录
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub call: DeviceCall,
    /// 发起调用的线程
    pub thread: ThreadId,
}

/// 回零脚本
#[derive(Debug, Clone)]
pub enum HomingBehavior {
    /// 经过 `after` 后成功；若 `after` 超过等待超时则返回超时
    Complete { after: Duration },
    /// 立即失败
    Fail { message: String },
    /// 一直阻塞，直到 [`MockDevice::release_homing`] 或等待超时
    Block,
}

impl Default for HomingBehavior {
    fn default() -> Self {
        HomingBehavior::Complete {
            after: Duration::ZERO,
        }
    }
}

/// Mock 设备
pub struct MockDevice {
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<HashSet<DeviceOp>>,
    registers: Mutex<HashMap<(u16, u8), f64>>,
    homing: Mutex<HomingBehavior>,
    read_latency: Mutex<Duration>,
    enabled: AtomicBool,
    read_count: AtomicU64,
    released: Mutex<bool>,
    release_cv: Condvar,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashSet::new()),
            registers: Mutex::new(HashMap::new()),
            homing: Mutex::new(HomingBehavior::default()),
            read_latency: Mutex::new(Duration::ZERO),
            enabled: AtomicBool::new(false),
            read_count: AtomicU64::new(0),
            released: Mutex::new(false),
            release_cv: Condvar::new(),
        }
    }

    /// 之后该操作的每次调用都返回通信错误
    pub fn fail_on(&self, op: DeviceOp) {
        self.failures.lock().insert(op);
    }

    pub fn clear_failure(&self, op: DeviceOp) {
        self.failures.lock().remove(&op);
    }

    pub fn set_register_value(&self, register: &Register, value: f64) {
        self.registers
            .lock()
            .insert((register.index, register.subindex), value);
    }

    pub fn set_homing_behavior(&self, behavior: HomingBehavior) {
        *self.homing.lock() = behavior;
    }

    /// 每次 `read_register` 的附加耗时
    pub fn set_read_latency(&self, latency: Duration) {
        *self.read_latency.lock() = latency;
    }

    /// 解除 `HomingBehavior::Block`，阻塞中的等待随即成功返回
    pub fn release_homing(&self) {
        let mut released = self.released.lock();
        *released = true;
        self.release_cv.notify_all();
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, op: DeviceOp) -> usize {
        self.calls.lock().iter().filter(|c| c.call.op() == op).count()
    }

    /// 指定线程发起的某类调用次数
    pub fn count_on_thread(&self, op: DeviceOp, thread: ThreadId) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.call.op() == op && c.thread == thread)
            .count()
    }

    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// 最近一次设置的运行模式
    pub fn last_mode(&self) -> Option<OperationMode> {
        self.calls.lock().iter().rev().find_map(|c| match c.call {
            DeviceCall::SetMode(mode) => Some(mode),
            _ => None,
        })
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: DeviceCall) -> Result<(), DeviceError> {
        let op = call.op();
        trace!("mock device: {:?}", call);
        self.calls.lock().push(RecordedCall {
            call,
            thread: thread::current().id(),
        });
        if self.failures.lock().contains(&op) {
            debug!("mock device: injected failure on {:?}", op);
            return Err(DeviceError::communication(
                CommunicationErrorKind::NoResponse,
                format!("injected failure on {:?}", op),
            ));
        }
        Ok(())
    }
}

impl Device for MockDevice {
    fn set_mode(&self, mode: OperationMode) -> Result<(), DeviceError> {
        self.record(DeviceCall::SetMode(mode))
    }

    fn enable(&self) -> Result<(), DeviceError> {
        self.record(DeviceCall::Enable)?;
        self.enabled.store(true, Ordering::Release);
        Ok(())
    }

    fn disable(&self) -> Result<(), DeviceError> {
        self.record(DeviceCall::Disable)?;
        self.enabled.store(false, Ordering::Release);
        Ok(())
    }

    fn set_position_units(&self, units: PositionUnits) -> Result<(), DeviceError> {
        self.record(DeviceCall::SetPositionUnits(units))
    }

    fn set_velocity_units(&self, units: VelocityUnits) -> Result<(), DeviceError> {
        self.record(DeviceCall::SetVelocityUnits(units))
    }

    fn set_position_target(&self, value: f64) -> Result<(), DeviceError> {
        self.record(DeviceCall::SetPositionTarget(value))
    }

    fn set_velocity_target(&self, value: f64) -> Result<(), DeviceError> {
        self.record(DeviceCall::SetVelocityTarget(value))
    }

    fn read_register(&self, register: &Register) -> Result<f64, DeviceError> {
        self.read_count.fetch_add(1, Ordering::AcqRel);
        let latency = *self.read_latency.lock();
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        self.record(DeviceCall::ReadRegister(*register))?;
        Ok(self
            .registers
            .lock()
            .get(&(register.index, register.subindex))
            .copied()
            .unwrap_or(0.0))
    }

    fn homing_start(&self) -> Result<(), DeviceError> {
        *self.released.lock() = false;
        self.record(DeviceCall::HomingStart)
    }

    fn homing_wait(&self, timeout: Duration) -> Result<(), DeviceError> {
        self.record(DeviceCall::HomingWait(timeout))?;
        let timeout_ms = timeout.as_millis() as u64;

        let behavior = self.homing.lock().clone();
        match behavior {
            HomingBehavior::Complete { after } => {
                if after > timeout {
                    thread::sleep(timeout);
                    return Err(DeviceError::Timeout { timeout_ms });
                }
                thread::sleep(after);
                Ok(())
            },
            HomingBehavior::Fail { message } => Err(DeviceError::communication(
                CommunicationErrorKind::Fault,
                message,
            )),
            HomingBehavior::Block => {
                let deadline = Instant::now() + timeout;
                let mut released = self.released.lock();
                while !*released {
                    if self.release_cv.wait_until(&mut released, deadline).timed_out() {
                        return Err(DeviceError::Timeout { timeout_ms });
                    }
                }
                Ok(())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scope_protocol::{POS_ACTUAL, VEL_ACTUAL};
    use std::sync::Arc;

    #[test]
    fn test_records_calls_with_thread() {
        let device = MockDevice::new();
        device.set_mode(OperationMode::ProfilePosition).unwrap();
        device.enable().unwrap();
        device.disable().unwrap();

        let calls = device.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].call, DeviceCall::SetMode(OperationMode::ProfilePosition));
        assert!(calls.iter().all(|c| c.thread == thread::current().id()));
        assert_eq!(device.last_mode(), Some(OperationMode::ProfilePosition));
        assert!(!device.is_enabled());
    }

    #[test]
    fn test_failure_injection() {
        let device = MockDevice::new();
        device.fail_on(DeviceOp::Enable);
        assert!(matches!(device.enable(), Err(DeviceError::Communication(_))));
        assert!(!device.is_enabled());

        device.clear_failure(DeviceOp::Enable);
        assert!(device.enable().is_ok());
        assert!(device.is_enabled());
        assert_eq!(device.count(DeviceOp::Enable), 2);
    }

    #[test]
    fn test_register_values() {
        let device = MockDevice::new();
        device.set_register_value(&VEL_ACTUAL, -3.5);
        assert_eq!(device.read_register(&VEL_ACTUAL).unwrap(), -3.5);
        // 未设置的寄存器读回 0
        assert_eq!(device.read_register(&POS_ACTUAL).unwrap(), 0.0);
        assert_eq!(device.read_count(), 2);
    }

    #[test]
    fn test_homing_complete_and_timeout() {
        let device = MockDevice::new();
        assert!(device.homing_wait(Duration::from_millis(10)).is_ok());

        device.set_homing_behavior(HomingBehavior::Complete {
            after: Duration::from_secs(5),
        });
        let err = device.homing_wait(Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, DeviceError::Timeout { timeout_ms: 5 }));
    }

    #[test]
    fn test_homing_fail() {
        let device = MockDevice::new();
        device.set_homing_behavior(HomingBehavior::Fail {
            message: "limit switch".to_string(),
        });
        let err = device.homing_wait(Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().contains("limit switch"));
    }

    #[test]
    fn test_homing_block_release() {
        let device = Arc::new(MockDevice::new());
        device.set_homing_behavior(HomingBehavior::Block);
        device.homing_start().unwrap();

        let waiter = {
            let device = device.clone();
            thread::spawn(move || device.homing_wait(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(20));
        device.release_homing();

        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn test_homing_block_times_out() {
        let device = MockDevice::new();
        device.set_homing_behavior(HomingBehavior::Block);
        device.homing_start().unwrap();
        let err = device.homing_wait(Duration::from_millis(10)).unwrap_err();
        assert!(err.is_timeout());
    }
}
