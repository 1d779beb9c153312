//! 单轴监控状态机
//!
//! `Supervisor` 是轴状态的唯一写入者：所有命令都在持有它的线程上同步执行，
//! 后台线程（回零、采样）只通过事件通道回报结果。
//!
//! # 设计
//!
//! - **先校验后执行**：命令先查 [`transition`] 表，非法命令直接返回
//!   `SupervisorError::IllegalCommand`，不产生任何副作用
//! - **失败不留中间态**：进入控制模式的任何一步失败，都会尽力失能设备、
//!   发送状态文本并保持原状态
//! - **运行编号**：每次回零、每次遥测启动都分配新的编号，过期事件被丢弃
//!
//! # 示例
//!
//! ```rust,ignore
//! use scope_client::{ScopeConfig, Supervisor};
//! use scope_driver::NullSink;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let mut supervisor = Supervisor::new(device, Arc::new(NullSink), ScopeConfig::default())?;
//! supervisor.request_homing()?;
//! while supervisor.state() == AxisState::Homing {
//!     supervisor.wait_event(Duration::from_millis(100));
//! }
//! supervisor.toggle_position_control()?;
//! supervisor.set_position_target(90.0)?;
//! ```

use crate::config::{MotionRanges, ScopeConfig};
use crate::error::SupervisorError;
use crate::events::SupervisorEvent;
use crate::homing::{HomingOutcome, HomingWorker};
use crate::state::transition::{Command, transition};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use scope_device::SharedDevice;
use scope_driver::{DisplaySink, Poller, PumpMode, SampleBuffer, TelemetryPump};
use scope_protocol::{AxisState, Channel, OperationMode, PositionUnits, Sample, VelocityUnits};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 回零状态文本
pub const HOMING_RUNNING_TEXT: &str = "Running...";

/// 单轴监控状态机
pub struct Supervisor {
    axis: SharedDevice,
    sink: Arc<dyn DisplaySink>,
    config: ScopeConfig,

    state: AxisState,
    channel: Option<Channel>,
    buffer: Arc<Mutex<SampleBuffer>>,

    pump: Option<TelemetryPump>,
    homing: Option<HomingWorker>,
    /// 结果已被外部处理、线程尚未退出的回零线程
    retired: Vec<HomingWorker>,

    homing_run: u64,
    telemetry_run: u64,
    last_homing: Option<HomingOutcome>,

    events_tx: Sender<SupervisorEvent>,
    events_rx: Receiver<SupervisorEvent>,
}

impl Supervisor {
    /// 创建状态机
    ///
    /// 经过瞬态 `Init` 后立即进入 `Idle`，两次状态变化都会通知显示端。
    pub fn new(
        axis: SharedDevice,
        sink: Arc<dyn DisplaySink>,
        config: ScopeConfig,
    ) -> Result<Self, SupervisorError> {
        config.validate()?;

        let buffer = SampleBuffer::new(
            config.telemetry.n_samples,
            Duration::from_millis(config.poller.period_ms),
        );
        let (events_tx, events_rx) = unbounded();

        sink.on_state_changed(AxisState::Init);
        let mut supervisor = Self {
            axis,
            sink,
            config,
            state: AxisState::Init,
            channel: None,
            buffer: Arc::new(Mutex::new(buffer)),
            pump: None,
            homing: None,
            retired: Vec::new(),
            homing_run: 0,
            telemetry_run: 0,
            last_homing: None,
            events_tx,
            events_rx,
        };
        supervisor.set_state(AxisState::Idle);
        Ok(supervisor)
    }

    // ==================== 命令 ====================

    /// 开始回零（仅 `Idle`）
    pub fn request_homing(&mut self) -> Result<(), SupervisorError> {
        let next = self.check(Command::RequestHoming)?;
        self.ensure_device_free(Command::RequestHoming)?;

        let run_id = self.homing_run + 1;
        let worker = HomingWorker::spawn(
            self.axis.clone(),
            self.config.homing_timeout(),
            self.events_tx.clone(),
            run_id,
        )
        .inspect_err(|e| {
            error!("Failed to start homing: {}", e);
            self.sink.on_status_message(&format!("Error: {}", e));
        })?;

        self.homing_run = run_id;
        self.homing = Some(worker);
        self.set_state(next);
        self.sink.on_status_message(HOMING_RUNNING_TEXT);
        Ok(())
    }

    /// 处理回零结果（仅 `Homing`）
    ///
    /// 记录结果、发送状态文本、无条件失能设备并回到 `Idle`。
    /// 不在 `Homing` 状态时忽略并返回 `false`。
    ///
    /// 本方法在调用线程上恰好调用一次 `disable()`；回零线程退出时在自己的线程上
    /// 也会失能一次，因此设备总共可能收到两次 `disable()`，`Device::disable`
    /// 必须幂等。
    ///
    /// 回零线程尚未退出时被外部调用，该线程会被挂起等待回收：在它退出之前，
    /// `request_homing` 与进入控制模式都返回 [`SupervisorError::HomingWorkerBusy`]。
    pub fn on_homing_complete(&mut self, outcome: HomingOutcome) -> bool {
        if self.check(Command::HomingComplete).is_err() {
            warn!(
                "Homing outcome '{}' arrived in state {}, ignoring",
                outcome, self.state
            );
            return false;
        }

        info!("Homing {}", outcome);
        self.sink.on_status_message(&outcome.status_text());
        if let Err(e) = self.axis.disable() {
            warn!("Failed to disable axis after homing: {}", e);
        }
        self.last_homing = Some(outcome);

        if let Some(worker) = self.homing.take() {
            self.retire(worker);
        }
        self.set_state(AxisState::Idle);
        true
    }

    /// 进入 / 退出位置控制
    pub fn toggle_position_control(&mut self) -> Result<(), SupervisorError> {
        self.toggle_control(Channel::Position)
    }

    /// 进入 / 退出速度控制
    pub fn toggle_velocity_control(&mut self) -> Result<(), SupervisorError> {
        self.toggle_control(Channel::Velocity)
    }

    /// 设置位置目标（仅 `PositionControl`，原样下发）
    pub fn set_position_target(&mut self, value: f64) -> Result<(), SupervisorError> {
        self.check(Command::SetPositionTarget)?;
        debug!("Position target {}", value);
        self.axis
            .set_position_target(value)
            .map_err(|e| self.report_failure("set position target", e.into()))
    }

    /// 设置速度目标（仅 `VelocityControl`，原样下发）
    pub fn set_velocity_target(&mut self, value: f64) -> Result<(), SupervisorError> {
        self.check(Command::SetVelocityTarget)?;
        debug!("Velocity target {}", value);
        self.axis
            .set_velocity_target(value)
            .map_err(|e| self.report_failure("set velocity target", e.into()))
    }

    // ==================== 事件 ====================

    /// 非阻塞地处理所有待处理事件，返回实际生效的事件数
    ///
    /// 协作模式下顺带驱动遥测泵。
    pub fn process_events(&mut self) -> usize {
        self.reap_retired();

        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.apply(event) {
                applied += 1;
            }
        }

        if let Some(pump) = self.pump.as_mut() {
            pump.service();
        }
        applied
    }

    /// 最多阻塞 `timeout` 等待一个事件并处理
    ///
    /// 返回是否有事件生效。过期事件被丢弃后继续等待。
    pub fn wait_event(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            let now = Instant::now();
            let remaining = deadline.saturating_duration_since(now);
            let slice = match &self.pump {
                Some(pump) if pump.config().mode == PumpMode::Cooperative => {
                    remaining.min(pump.config().interval())
                },
                _ => remaining,
            };

            match self.events_rx.recv_timeout(slice) {
                Ok(event) => {
                    if self.apply(event) {
                        return true;
                    }
                },
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(pump) = self.pump.as_mut() {
                        pump.service();
                    }
                    if Instant::now() >= deadline {
                        return false;
                    }
                },
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    /// 关闭：停止遥测，等待回零结束，失能设备，停在 `Idle`
    pub fn shutdown(&mut self) {
        info!("Supervisor shutting down from {}", self.state);

        if self.state.is_streaming()
            && let Err(e) = self.leave_control()
        {
            warn!("Error while leaving control during shutdown: {}", e);
        }

        if self.state == AxisState::Homing {
            self.await_homing();
        }

        for worker in self.retired.drain(..) {
            if worker.join().is_err() {
                error!("Homing worker panicked");
            }
        }

        if let Err(e) = self.axis.disable() {
            warn!("Failed to disable axis on shutdown: {}", e);
        }
        self.set_state(AxisState::Idle);
    }

    // ==================== 查询 ====================

    pub fn state(&self) -> AxisState {
        self.state
    }

    /// 最近一次进入控制模式时选定的遥测通道
    pub fn channel(&self) -> Option<Channel> {
        self.channel
    }

    /// 显示窗口快照（N 个点）
    pub fn snapshot(&self) -> Vec<Sample> {
        self.buffer.lock().snapshot()
    }

    /// 最新的采样点
    pub fn latest(&self) -> Option<Sample> {
        self.buffer.lock().latest()
    }

    pub fn last_homing_outcome(&self) -> Option<&HomingOutcome> {
        self.last_homing.as_ref()
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    pub fn ranges(&self) -> MotionRanges {
        self.config.ranges()
    }

    /// 当前遥测泵（仅控制状态下存在）
    pub fn telemetry(&self) -> Option<&TelemetryPump> {
        self.pump.as_ref()
    }

    /// 立即执行一次遥测泵 tick，无遥测时返回 0
    pub fn pump_tick(&self) -> usize {
        self.pump.as_ref().map_or(0, |pump| pump.tick())
    }

    // ==================== 内部实现 ====================

    fn check(&self, command: Command) -> Result<AxisState, SupervisorError> {
        transition(self.state, command).ok_or_else(|| {
            warn!("Rejected '{}' in state {}", command, self.state);
            SupervisorError::IllegalCommand {
                command,
                state: self.state,
            }
        })
    }

    /// 被提前交出结果的回零线程退出前，设备仍归它使用
    fn ensure_device_free(&mut self, command: Command) -> Result<(), SupervisorError> {
        self.reap_retired();
        if self.retired.is_empty() {
            return Ok(());
        }
        warn!(
            "Rejected '{}': {} homing worker(s) still running",
            command,
            self.retired.len()
        );
        Err(SupervisorError::HomingWorkerBusy { command })
    }

    fn set_state(&mut self, next: AxisState) {
        if self.state != next {
            info!("Axis state {} -> {}", self.state, next);
            self.state = next;
            self.sink.on_state_changed(next);
        }
    }

    fn report_failure(&self, action: &str, err: SupervisorError) -> SupervisorError {
        error!("Failed to {}: {}", action, err);
        self.sink.on_status_message(&format!("Error: {}", err));
        err
    }

    fn toggle_control(&mut self, channel: Channel) -> Result<(), SupervisorError> {
        let command = match channel {
            Channel::Position => Command::TogglePositionControl,
            Channel::Velocity => Command::ToggleVelocityControl,
        };

        if self.check(command)? == AxisState::Idle {
            self.leave_control()
        } else {
            self.ensure_device_free(command)?;
            self.enter_control(channel)
        }
    }

    fn enter_control(&mut self, channel: Channel) -> Result<(), SupervisorError> {
        info!("Entering {} control", channel.label().to_lowercase());

        match self.start_control(channel) {
            Ok(pump) => {
                self.pump = Some(pump);
                self.channel = Some(channel);
                self.set_state(channel.control_state());
                Ok(())
            },
            Err(e) => {
                // 设备可能已经使能
                if let Err(disable_err) = self.axis.disable() {
                    warn!("Failed to disable axis after aborted transition: {}", disable_err);
                }
                Err(self.report_failure("enter control", e))
            },
        }
    }

    fn start_control(&mut self, channel: Channel) -> Result<TelemetryPump, SupervisorError> {
        match channel {
            Channel::Position => {
                self.axis.set_mode(OperationMode::ProfilePosition)?;
                self.axis.set_position_units(PositionUnits::Degrees)?;
            },
            Channel::Velocity => {
                self.axis.set_mode(OperationMode::ProfileVelocity)?;
                self.axis.set_velocity_units(VelocityUnits::RevolutionsPerSecond)?;
            },
        }
        self.axis.enable()?;

        self.buffer.lock().reset();

        self.telemetry_run += 1;
        let run_id = self.telemetry_run;
        let events = self.events_tx.clone();

        let mut poller = Poller::new(self.config.poller_config())?;
        poller.set_fault_handler(move |fault| {
            let _ = events.send(SupervisorEvent::TelemetryFault { run_id, fault });
        });

        let mut pump = TelemetryPump::with_buffer(
            poller,
            self.buffer.clone(),
            self.sink.clone(),
            self.config.pump_config(),
        )?;
        pump.start(self.axis.clone(), channel.register())?;
        Ok(pump)
    }

    /// 停止遥测、失能并回到 `Idle`
    ///
    /// 失能失败时仍然回到 `Idle`（遥测已停止），错误被返回。
    fn leave_control(&mut self) -> Result<(), SupervisorError> {
        info!("Leaving {}", self.state);

        if let Some(mut pump) = self.pump.take() {
            pump.stop();
            debug!(
                "Telemetry stopped: {} snapshots, {} samples dropped",
                pump.tick_count(),
                pump.poller().dropped_count()
            );
        }

        let result = self
            .axis
            .disable()
            .map_err(|e| self.report_failure("disable axis", e.into()));
        self.set_state(AxisState::Idle);
        result
    }

    fn apply(&mut self, event: SupervisorEvent) -> bool {
        match event {
            SupervisorEvent::HomingFinished { run_id, outcome } => {
                if run_id != self.homing_run || self.state != AxisState::Homing {
                    debug!("Dropping stale homing outcome from run {}", run_id);
                    return false;
                }
                // 结果已发出，线程即将退出
                if let Some(worker) = self.homing.take()
                    && worker.join().is_err()
                {
                    error!("Homing worker panicked");
                }
                self.on_homing_complete(outcome)
            },
            SupervisorEvent::TelemetryFault { run_id, fault } => {
                if run_id != self.telemetry_run || !self.state.is_streaming() {
                    debug!("Dropping stale telemetry fault from run {}", run_id);
                    return false;
                }
                error!(
                    "Telemetry lost on {} after {} failed reads: {}",
                    fault.register, fault.consecutive_failures, fault.last_error
                );
                self.sink.on_status_message(&format!(
                    "Error: telemetry lost ({})",
                    fault.last_error
                ));
                if let Err(e) = self.leave_control() {
                    warn!("Error while leaving control after telemetry fault: {}", e);
                }
                true
            },
        }
    }

    /// 等待当前回零线程的结果（最多回零超时再加一秒）
    fn await_homing(&mut self) {
        let deadline = Instant::now() + self.config.homing_timeout() + Duration::from_secs(1);

        while self.state == AxisState::Homing {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events_rx.recv_timeout(remaining) {
                Ok(event) => {
                    self.apply(event);
                },
                Err(_) => {
                    error!("Homing worker did not report before deadline, detaching");
                    self.homing.take();
                    self.set_state(AxisState::Idle);
                },
            }
        }
    }

    fn retire(&mut self, worker: HomingWorker) {
        if worker.is_finished() {
            if worker.join().is_err() {
                error!("Homing worker panicked");
            }
        } else {
            self.retired.push(worker);
        }
    }

    fn reap_retired(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) =
            self.retired.drain(..).partition(|w| w.is_finished());
        self.retired = running;
        for worker in finished {
            if worker.join().is_err() {
                error!("Homing worker panicked");
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // 回零线程不等待，它退出时自行失能
        if let Some(mut pump) = self.pump.take() {
            pump.stop();
        }
        if let Err(e) = self.axis.disable() {
            warn!("Failed to disable axis on drop: {}", e);
        }
    }
}
