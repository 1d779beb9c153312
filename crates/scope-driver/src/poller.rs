//! 寄存器轮询线程
//!
//! 后台线程以固定周期读取一个寄存器，把 `(elapsed, value)` 采样点送入有界队列，
//! 由遥测泵以较低频率批量取走。
//!
//! # 设计
//!
//! - **绝对时间锚点**：每个周期的唤醒时刻为 `start + k·period`，读取耗时不会累积漂移；
//!   超时（overrun）时记录警告并把锚点重置到当前时刻
//! - **可中断等待**：粗等待在停止通道上进行（`recv_deadline`），最后不足
//!   [`SPIN_THRESHOLD`] 的部分交给 `spin_sleep`，`stop()` 不必等满一个周期
//! - **队列满丢最旧**：生产端永不阻塞，满时弹出最旧的未读点并计数
//! - **连续失败**：单次读取失败只记录警告并跳过；连续
//!   `max_consecutive_failures` 次失败后调用故障回调并退出线程

use crate::error::{ConfigError, DriverError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use scope_device::SharedDevice;
use scope_protocol::{Register, Sample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 剩余等待时间小于该阈值时改用自旋睡眠
pub const SPIN_THRESHOLD: Duration = Duration::from_millis(1);

/// 采样周期上限
pub const MAX_PERIOD: Duration = Duration::from_secs(60);

/// 轮询配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// 采样周期（默认 10ms）
    pub period: Duration,
    /// 队列容量（默认 100）
    pub buffer_size: usize,
    /// 连续失败多少次后判定故障（默认 5）
    pub max_consecutive_failures: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(10),
            buffer_size: 100,
            max_consecutive_failures: 5,
        }
    }
}

impl PollerConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period.is_zero() || self.period > MAX_PERIOD {
            return Err(ConfigError::InvalidPeriod {
                period: self.period,
            });
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize {
                size: self.buffer_size,
            });
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::InvalidFailureThreshold {
                threshold: self.max_consecutive_failures,
            });
        }
        Ok(())
    }
}

/// 轮询故障报告
#[derive(Debug, Clone, PartialEq)]
pub struct PollerFault {
    /// 被轮询的寄存器
    pub register: Register,
    /// 连续失败次数
    pub consecutive_failures: u32,
    /// 最后一次错误
    pub last_error: String,
}

/// 故障回调（在采样线程中调用，不得阻塞）
pub type FaultHandler = Arc<dyn Fn(PollerFault) + Send + Sync>;

/// 队列的消费端句柄
///
/// 可克隆，供遥测泵的定时线程使用。
#[derive(Clone)]
pub struct SampleReader {
    rx: Receiver<Sample>,
}

impl SampleReader {
    /// 非阻塞地取走当前队列中的全部采样点
    ///
    /// 只取调用时刻已入队的数量，生产端持续写入时也会及时返回。
    pub fn drain(&self) -> Vec<Sample> {
        let pending = self.rx.len();
        self.rx.try_iter().take(pending).collect()
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// 队列的生产端句柄
///
/// 与采样线程共用同一丢弃策略。
#[derive(Clone)]
pub struct SampleWriter {
    tx: Sender<Sample>,
    rx: Receiver<Sample>,
    dropped: Arc<AtomicU64>,
}

impl SampleWriter {
    /// 入队；队列满时丢弃最旧的未读点
    pub fn push(&self, sample: Sample) {
        let mut sample = sample;
        loop {
            match self.tx.try_send(sample) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if self.rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    sample = rejected;
                },
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// 寄存器轮询器
pub struct Poller {
    config: PollerConfig,
    writer: SampleWriter,
    reader: SampleReader,
    is_running: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    produced: Arc<AtomicU64>,
    fault_handler: Option<FaultHandler>,
}

impl Poller {
    /// 创建轮询器（不启动线程）
    ///
    /// # 错误
    ///
    /// 配置非法时返回 [`ConfigError`]。
    pub fn new(config: PollerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let (tx, rx) = bounded(config.buffer_size);
        let dropped = Arc::new(AtomicU64::new(0));

        Ok(Self {
            writer: SampleWriter {
                tx,
                rx: rx.clone(),
                dropped,
            },
            reader: SampleReader { rx },
            config,
            is_running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            thread: None,
            produced: Arc::new(AtomicU64::new(0)),
            fault_handler: None,
        })
    }

    /// 设置故障回调，对之后的 `start()` 生效
    pub fn set_fault_handler<F>(&mut self, handler: F)
    where
        F: Fn(PollerFault) + Send + Sync + 'static,
    {
        self.fault_handler = Some(Arc::new(handler));
    }

    /// 启动采样线程
    ///
    /// 启动前清空队列中的残留点。
    ///
    /// # 错误
    ///
    /// - `DriverError::AlreadyRunning`: 采样线程已存在
    /// - `DriverError::ThreadSpawn`: 线程创建失败
    pub fn start(&mut self, device: SharedDevice, register: Register) -> Result<(), DriverError> {
        if self.thread.is_some() {
            return Err(DriverError::AlreadyRunning);
        }

        self.clear();
        self.is_running.store(true, Ordering::Release);

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ctx = SamplingContext {
            device,
            register,
            config: self.config.clone(),
            writer: self.writer.clone(),
            is_running: self.is_running.clone(),
            produced: self.produced.clone(),
            fault_handler: self.fault_handler.clone(),
            stop_rx,
        };

        let handle = thread::Builder::new()
            .name("scope-poller".into())
            .spawn(move || sampling_loop(ctx))
            .map_err(|e| {
                self.is_running.store(false, Ordering::Release);
                DriverError::ThreadSpawn(e)
            })?;

        self.stop_tx = Some(stop_tx);
        self.thread = Some(handle);
        info!(
            "Poller started on {} (period {:?}, queue {})",
            register, self.config.period, self.config.buffer_size
        );
        Ok(())
    }

    /// 停止采样线程并等待其退出
    ///
    /// 返回后不会再有读取发生，队列中该次运行的残留点被清空。对未启动的轮询器调用是空操作。
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        // 关闭停止通道，唤醒正在等待的采样线程
        self.stop_tx.take();

        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("Poller thread panicked");
            }
            debug!("Poller stopped after {} samples", self.sample_count());
        }

        self.clear();
    }

    /// 非阻塞地取走当前队列中的全部采样点
    pub fn drain(&self) -> Vec<Sample> {
        self.reader.drain()
    }

    /// 消费端句柄
    pub fn reader(&self) -> SampleReader {
        self.reader.clone()
    }

    /// 生产端句柄（用于注入采样点）
    pub fn writer(&self) -> SampleWriter {
        self.writer.clone()
    }

    /// 采样线程是否在运行
    ///
    /// 故障退出后返回 `false`。
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 因队列满而丢弃的采样点数
    pub fn dropped_count(&self) -> u64 {
        self.writer.dropped.load(Ordering::Relaxed)
    }

    /// 采样线程累计产生的采样点数
    pub fn sample_count(&self) -> u64 {
        self.produced.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    fn clear(&self) {
        while self.reader.rx.try_recv().is_ok() {}
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

struct SamplingContext {
    device: SharedDevice,
    register: Register,
    config: PollerConfig,
    writer: SampleWriter,
    is_running: Arc<AtomicBool>,
    produced: Arc<AtomicU64>,
    fault_handler: Option<FaultHandler>,
    stop_rx: Receiver<()>,
}

impl SamplingContext {
    /// 等待到 `deadline`；收到停止信号时返回 `false`
    fn wait_until(&self, deadline: Instant) -> bool {
        if let Some(coarse) = deadline.checked_sub(SPIN_THRESHOLD)
            && coarse > Instant::now()
        {
            match self.stop_rx.recv_deadline(coarse) {
                Err(RecvTimeoutError::Timeout) => {},
                _ => return false,
            }
        }

        let now = Instant::now();
        if deadline > now {
            spin_sleep::sleep(deadline - now);
        }
        self.is_running.load(Ordering::Acquire)
    }
}

fn sampling_loop(ctx: SamplingContext) {
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("Poller thread priority set to MAX (realtime)");
            },
            Err(e) => {
                warn!(
                    "Failed to set poller thread priority: {}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    e
                );
            },
        }
    }

    let period = ctx.config.period;
    let start = Instant::now();
    let mut next_tick = start + period;
    let mut consecutive_failures: u32 = 0;

    loop {
        let now = Instant::now();
        if next_tick > now {
            if !ctx.wait_until(next_tick) {
                trace!("Poller: stop requested, exiting");
                break;
            }
        } else {
            warn!(
                "Poller overrun: next tick was {:?} ago (period {:?}), resetting anchor",
                now.duration_since(next_tick),
                period
            );
            next_tick = now;
            if !ctx.is_running.load(Ordering::Acquire) {
                break;
            }
        }

        match ctx.device.read_register(&ctx.register) {
            Ok(value) => {
                consecutive_failures = 0;
                let sample = Sample::new(start.elapsed().as_secs_f64(), value);
                ctx.writer.push(sample);
                ctx.produced.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures >= ctx.config.max_consecutive_failures {
                    error!(
                        "Consecutive read failures on {} ({}): {}. Stopping poller.",
                        ctx.register, consecutive_failures, e
                    );
                    ctx.is_running.store(false, Ordering::Release);
                    if let Some(handler) = &ctx.fault_handler {
                        handler(PollerFault {
                            register: ctx.register,
                            consecutive_failures,
                            last_error: e.to_string(),
                        });
                    }
                    break;
                }
                warn!(
                    "Transient read failure on {} ({}): {}, skipping sample",
                    ctx.register, consecutive_failures, e
                );
            },
        }

        next_tick += period;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use scope_device::{DeviceOp, MockDevice};
    use scope_protocol::{POS_ACTUAL, VEL_ACTUAL};

    fn fast_config() -> PollerConfig {
        PollerConfig {
            period: Duration::from_millis(2),
            buffer_size: 100,
            max_consecutive_failures: 3,
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(PollerConfig::default().validate().is_ok());

        let bad = PollerConfig {
            period: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(Poller::new(bad), Err(ConfigError::InvalidPeriod { .. })));

        let bad = PollerConfig {
            period: MAX_PERIOD + Duration::from_millis(1),
            ..Default::default()
        };
        assert!(matches!(Poller::new(bad), Err(ConfigError::InvalidPeriod { .. })));
        let edge = PollerConfig {
            period: MAX_PERIOD,
            ..Default::default()
        };
        assert!(edge.validate().is_ok());

        let bad = PollerConfig {
            buffer_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            Poller::new(bad),
            Err(ConfigError::InvalidBufferSize { size: 0 })
        ));

        let bad = PollerConfig {
            max_consecutive_failures: 0,
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidFailureThreshold { threshold: 0 })
        ));
    }

    #[test]
    fn test_poller_produces_samples() {
        let device = Arc::new(MockDevice::new());
        device.set_register_value(&POS_ACTUAL, 7.0);

        let mut poller = Poller::new(fast_config()).unwrap();
        poller.start(device.clone(), POS_ACTUAL).unwrap();
        assert!(poller.is_running());
        thread::sleep(Duration::from_millis(50));

        let samples = poller.drain();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|s| s.value == 7.0));
        // 时间戳单调递增
        assert!(samples.windows(2).all(|w| w[0].time < w[1].time));

        poller.stop();
        assert!(!poller.is_running());
    }

    #[test]
    fn test_no_samples_after_stop() {
        let device = Arc::new(MockDevice::new());
        let mut poller = Poller::new(fast_config()).unwrap();
        poller.start(device.clone(), VEL_ACTUAL).unwrap();
        thread::sleep(Duration::from_millis(20));
        poller.stop();

        let reads = device.read_count();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(device.read_count(), reads);
        assert!(poller.drain().is_empty());
    }

    #[test]
    fn test_stop_interrupts_long_period() {
        let device = Arc::new(MockDevice::new());
        let mut poller = Poller::new(PollerConfig {
            period: Duration::from_secs(60),
            ..Default::default()
        })
        .unwrap();
        poller.start(device.clone(), POS_ACTUAL).unwrap();

        let begin = Instant::now();
        poller.stop();
        assert!(begin.elapsed() < Duration::from_secs(5));
        assert_eq!(device.read_count(), 0);
    }

    #[test]
    fn test_start_twice_rejected() {
        let device = Arc::new(MockDevice::new());
        let mut poller = Poller::new(fast_config()).unwrap();
        poller.start(device.clone(), POS_ACTUAL).unwrap();
        assert!(matches!(
            poller.start(device.clone(), POS_ACTUAL),
            Err(DriverError::AlreadyRunning)
        ));
        poller.stop();
        // 停止后可以重新启动
        assert!(poller.start(device, POS_ACTUAL).is_ok());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let poller = Poller::new(PollerConfig {
            buffer_size: 4,
            ..Default::default()
        })
        .unwrap();
        let writer = poller.writer();
        for i in 0..10 {
            writer.push(Sample::new(i as f64, i as f64));
        }

        assert_eq!(poller.dropped_count(), 6);
        let values: Vec<f64> = poller.drain().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_consecutive_failures_raise_fault() {
        let device = Arc::new(MockDevice::new());
        device.fail_on(DeviceOp::ReadRegister);

        let (fault_tx, fault_rx) = unbounded();
        let mut poller = Poller::new(fast_config()).unwrap();
        poller.set_fault_handler(move |fault| {
            let _ = fault_tx.send(fault);
        });
        poller.start(device.clone(), POS_ACTUAL).unwrap();

        let fault = fault_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(fault.register, POS_ACTUAL);
        assert_eq!(fault.consecutive_failures, 3);
        assert!(fault.last_error.contains("ReadRegister"));

        // 线程已自行退出，只报告一次
        thread::sleep(Duration::from_millis(20));
        assert!(!poller.is_running());
        assert_eq!(device.read_count(), 3);
        assert!(fault_rx.try_recv().is_err());
    }

    #[test]
    fn test_transient_failure_is_skipped() {
        let device = Arc::new(MockDevice::new());
        device.fail_on(DeviceOp::ReadRegister);

        let (fault_tx, fault_rx) = unbounded();
        let mut poller = Poller::new(PollerConfig {
            period: Duration::from_millis(5),
            buffer_size: 100,
            max_consecutive_failures: 1000,
        })
        .unwrap();
        poller.set_fault_handler(move |fault| {
            let _ = fault_tx.send(fault);
        });
        poller.start(device.clone(), POS_ACTUAL).unwrap();
        thread::sleep(Duration::from_millis(30));
        device.clear_failure(DeviceOp::ReadRegister);
        thread::sleep(Duration::from_millis(30));

        assert!(poller.is_running());
        assert!(!poller.drain().is_empty());
        assert!(fault_rx.try_recv().is_err());
        poller.stop();
    }
}
