//! 仿真伺服轴
//!
//! 一阶惯性模型：位置模式下位置按时间常数逼近目标，速度模式下速度逼近目标，
//! 回零模式下位置回到 0。状态在每次访问时按流逝时间推进，不需要后台线程。

use parking_lot::Mutex;
use scope_device::{CommunicationErrorKind, Device, DeviceError};
use scope_protocol::{
    OperationMode, POS_ACTUAL, PositionUnits, Register, VEL_ACTUAL, VelocityUnits,
};
use std::sync::atomic::{AtomicI8, AtomicU8, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// 仿真参数
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// 回零耗时
    pub homing_duration: Duration,
    /// 回零是否失败
    pub fail_homing: bool,
    /// 每次寄存器访问的延迟
    pub latency: Duration,
    /// 单次访问超时，延迟超过它时访问失败
    pub axis_timeout: Duration,
    /// 一阶时间常数
    pub time_constant: Duration,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            homing_duration: Duration::from_millis(800),
            fail_homing: false,
            latency: Duration::ZERO,
            axis_timeout: Duration::from_millis(100),
            time_constant: Duration::from_millis(250),
        }
    }
}

#[derive(Debug)]
struct Motion {
    enabled: bool,
    position_deg: f64,
    velocity_rps: f64,
    target_position_deg: f64,
    target_velocity_rps: f64,
    last_update: Instant,
}

/// 仿真伺服轴
pub struct SimAxis {
    options: SimOptions,
    motion: Mutex<Motion>,
    /// 0x6060 编码，0 表示未设置
    mode: AtomicI8,
    position_units: AtomicU8,
    velocity_units: AtomicU8,
}

impl SimAxis {
    pub fn new(options: SimOptions) -> Self {
        Self {
            options,
            motion: Mutex::new(Motion {
                enabled: false,
                position_deg: 0.0,
                velocity_rps: 0.0,
                target_position_deg: 0.0,
                target_velocity_rps: 0.0,
                last_update: Instant::now(),
            }),
            mode: AtomicI8::new(0),
            position_units: AtomicU8::new(PositionUnits::default().into()),
            velocity_units: AtomicU8::new(VelocityUnits::default().into()),
        }
    }

    fn mode(&self) -> Option<OperationMode> {
        OperationMode::from_code(self.mode.load(Ordering::Acquire)).ok()
    }

    fn position_units(&self) -> PositionUnits {
        PositionUnits::from_code(self.position_units.load(Ordering::Acquire)).unwrap_or_default()
    }

    fn velocity_units(&self) -> VelocityUnits {
        VelocityUnits::from_code(self.velocity_units.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// 模拟总线访问耗时
    fn access(&self) -> Result<(), DeviceError> {
        if self.options.latency.is_zero() {
            return Ok(());
        }
        if self.options.latency > self.options.axis_timeout {
            thread::sleep(self.options.axis_timeout);
            return Err(DeviceError::Timeout {
                timeout_ms: self.options.axis_timeout.as_millis() as u64,
            });
        }
        thread::sleep(self.options.latency);
        Ok(())
    }

    /// 推进模型到当前时刻
    fn advance(&self, motion: &mut Motion) {
        let now = Instant::now();
        let dt = now.duration_since(motion.last_update).as_secs_f64();
        motion.last_update = now;
        if dt <= 0.0 {
            return;
        }

        if !motion.enabled {
            motion.velocity_rps = 0.0;
            return;
        }

        let tau = self.options.time_constant.as_secs_f64().max(1e-3);
        let alpha = 1.0 - (-dt / tau).exp();

        match self.mode() {
            Some(OperationMode::ProfilePosition) => {
                let previous = motion.position_deg;
                motion.position_deg += (motion.target_position_deg - previous) * alpha;
                motion.velocity_rps = (motion.position_deg - previous) / 360.0 / dt;
            },
            Some(OperationMode::ProfileVelocity) => {
                motion.velocity_rps += (motion.target_velocity_rps - motion.velocity_rps) * alpha;
                motion.position_deg += motion.velocity_rps * 360.0 * dt;
            },
            Some(OperationMode::Homing) | None => {
                motion.velocity_rps = 0.0;
            },
        }
        trace!(
            "sim: pos {:.3} deg, vel {:.3} rps",
            motion.position_deg, motion.velocity_rps
        );
    }

    fn require_enabled(&self) -> Result<parking_lot::MutexGuard<'_, Motion>, DeviceError> {
        let mut motion = self.motion.lock();
        self.advance(&mut motion);
        if !motion.enabled {
            return Err(DeviceError::NotEnabled);
        }
        Ok(motion)
    }
}

impl Device for SimAxis {
    fn set_mode(&self, mode: OperationMode) -> Result<(), DeviceError> {
        self.access()?;
        let mut motion = self.motion.lock();
        self.advance(&mut motion);
        self.mode.store(mode.code(), Ordering::Release);
        debug!("sim: mode -> {}", mode);
        Ok(())
    }

    fn enable(&self) -> Result<(), DeviceError> {
        self.access()?;
        let mut motion = self.motion.lock();
        self.advance(&mut motion);
        motion.enabled = true;
        // 使能时保持当前位置
        motion.target_position_deg = motion.position_deg;
        motion.target_velocity_rps = 0.0;
        Ok(())
    }

    fn disable(&self) -> Result<(), DeviceError> {
        let mut motion = self.motion.lock();
        self.advance(&mut motion);
        motion.enabled = false;
        motion.velocity_rps = 0.0;
        Ok(())
    }

    fn set_position_units(&self, units: PositionUnits) -> Result<(), DeviceError> {
        self.access()?;
        self.position_units.store(units.into(), Ordering::Release);
        Ok(())
    }

    fn set_velocity_units(&self, units: VelocityUnits) -> Result<(), DeviceError> {
        self.access()?;
        self.velocity_units.store(units.into(), Ordering::Release);
        Ok(())
    }

    fn set_position_target(&self, value: f64) -> Result<(), DeviceError> {
        self.access()?;
        let degrees = self.position_units().to_degrees(value);
        self.require_enabled()?.target_position_deg = degrees;
        Ok(())
    }

    fn set_velocity_target(&self, value: f64) -> Result<(), DeviceError> {
        self.access()?;
        let rps = self.velocity_units().to_rps(value);
        self.require_enabled()?.target_velocity_rps = rps;
        Ok(())
    }

    fn read_register(&self, register: &Register) -> Result<f64, DeviceError> {
        self.access()?;
        if !register.is_readable() {
            return Err(DeviceError::communication(
                CommunicationErrorKind::AccessDenied,
                format!("register {} is not readable", register),
            ));
        }

        let mut motion = self.motion.lock();
        self.advance(&mut motion);

        if *register == POS_ACTUAL {
            Ok(self.position_units().from_degrees(motion.position_deg))
        } else if *register == VEL_ACTUAL {
            Ok(self.velocity_units().from_rps(motion.velocity_rps))
        } else {
            Err(DeviceError::communication(
                CommunicationErrorKind::InvalidResponse,
                format!("register {} not implemented by simulator", register),
            ))
        }
    }

    fn homing_start(&self) -> Result<(), DeviceError> {
        self.access()?;
        drop(self.require_enabled()?);
        if self.mode() != Some(OperationMode::Homing) {
            return Err(DeviceError::communication(
                CommunicationErrorKind::Fault,
                "homing requested outside homing mode",
            ));
        }
        Ok(())
    }

    fn homing_wait(&self, timeout: Duration) -> Result<(), DeviceError> {
        let timeout_ms = timeout.as_millis() as u64;

        if self.options.fail_homing {
            thread::sleep((self.options.homing_duration / 2).min(timeout));
            return Err(DeviceError::communication(
                CommunicationErrorKind::Fault,
                "home switch not found",
            ));
        }
        if self.options.homing_duration > timeout {
            thread::sleep(timeout);
            return Err(DeviceError::Timeout { timeout_ms });
        }

        thread::sleep(self.options.homing_duration);
        let mut motion = self.require_enabled()?;
        motion.position_deg = 0.0;
        motion.target_position_deg = 0.0;
        motion.velocity_rps = 0.0;
        Ok(())
    }
}
