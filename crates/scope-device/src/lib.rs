//! # Scope Device Layer
//!
//! 伺服设备能力抽象：上层（遥测线程、回零线程、状态机）只通过 [`Device`] trait
//! 访问驱动器，不关心底层总线、协议与寄存器传输。
//!
//! # 线程模型
//!
//! `Device` 要求 `Send + Sync`，所有方法都以 `&self` 调用。实现者自行负责内部同步，
//! 同一时刻只有一个执行上下文（轮询线程或回零线程）在使用设备，这一点由上层状态机保证。

use scope_protocol::{OperationMode, PositionUnits, Register, VelocityUnits};
use std::sync::Arc;
use std::time::Duration;

mod error;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{CommunicationError, CommunicationErrorKind, DeviceError};

#[cfg(any(test, feature = "mock"))]
pub use mock::{DeviceCall, DeviceOp, HomingBehavior, MockDevice, RecordedCall};

/// 跨线程共享的设备句柄
pub type SharedDevice = Arc<dyn Device>;

/// 伺服设备能力
///
/// 每个操作都可能因通信失败返回 [`DeviceError`]。
///
/// # 约定
///
/// - `disable()` 必须可以在已失能的设备上安全调用（幂等）
/// - `read_register()` 是阻塞调用，耗时取决于总线，调用方不得持锁调用
/// - `homing_wait()` 最多阻塞 `timeout`，超时返回 `DeviceError::Timeout`
pub trait Device: Send + Sync {
    /// 设置运行模式
    fn set_mode(&self, mode: OperationMode) -> Result<(), DeviceError>;

    /// 使能（上电）
    fn enable(&self) -> Result<(), DeviceError>;

    /// 失能（断电），对已失能设备必须是空操作
    fn disable(&self) -> Result<(), DeviceError>;

    /// 设置位置单位
    fn set_position_units(&self, units: PositionUnits) -> Result<(), DeviceError>;

    /// 设置速度单位
    fn set_velocity_units(&self, units: VelocityUnits) -> Result<(), DeviceError>;

    /// 设置位置目标（当前位置单位）
    fn set_position_target(&self, value: f64) -> Result<(), DeviceError>;

    /// 设置速度目标（当前速度单位）
    fn set_velocity_target(&self, value: f64) -> Result<(), DeviceError>;

    /// 读取寄存器并按当前单位换算
    fn read_register(&self, register: &Register) -> Result<f64, DeviceError>;

    /// 启动回零
    fn homing_start(&self) -> Result<(), DeviceError>;

    /// 阻塞等待回零完成（最多 `timeout`）
    fn homing_wait(&self, timeout: Duration) -> Result<(), DeviceError>;
}

impl<D: Device + ?Sized> Device for Arc<D> {
    fn set_mode(&self, mode: OperationMode) -> Result<(), DeviceError> {
        (**self).set_mode(mode)
    }

    fn enable(&self) -> Result<(), DeviceError> {
        (**self).enable()
    }

    fn disable(&self) -> Result<(), DeviceError> {
        (**self).disable()
    }

    fn set_position_units(&self, units: PositionUnits) -> Result<(), DeviceError> {
        (**self).set_position_units(units)
    }

    fn set_velocity_units(&self, units: VelocityUnits) -> Result<(), DeviceError> {
        (**self).set_velocity_units(units)
    }

    fn set_position_target(&self, value: f64) -> Result<(), DeviceError> {
        (**self).set_position_target(value)
    }

    fn set_velocity_target(&self, value: f64) -> Result<(), DeviceError> {
        (**self).set_velocity_target(value)
    }

    fn read_register(&self, register: &Register) -> Result<f64, DeviceError> {
        (**self).read_register(register)
    }

    fn homing_start(&self) -> Result<(), DeviceError> {
        (**self).homing_start()
    }

    fn homing_wait(&self, timeout: Duration) -> Result<(), DeviceError> {
        (**self).homing_wait(timeout)
    }
}
