//! 遥测泵
//!
//! 以显示刷新率（默认 30 Hz）从轮询队列批量取点，推入滚动窗口，并把整窗快照交给显示端。
//!
//! # 运行方式
//!
//! - [`PumpMode::Threaded`]：独立定时线程，绝对时间锚点 + `spin_sleep`
//! - [`PumpMode::Cooperative`]：不创建线程，由调用方在自己的事件循环中调用
//!   [`TelemetryPump::service`]（到期才执行）或 [`TelemetryPump::tick`]（立即执行）
//!
//! 两种方式下 tick 都串行执行，不会重叠。

use crate::buffer::SampleBuffer;
use crate::error::{ConfigError, DriverError};
use crate::poller::{Poller, SampleReader};
use crate::sink::DisplaySink;
use parking_lot::Mutex;
use scope_device::SharedDevice;
use scope_protocol::{Register, Sample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// 泵的驱动方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PumpMode {
    /// 独立定时线程
    #[default]
    Threaded,
    /// 由调用方驱动
    Cooperative,
}

/// 遥测泵配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpConfig {
    /// 刷新率（默认 30 Hz）
    pub rate_hz: u32,
    /// 显示窗口长度 N（默认 1000）
    pub n_samples: usize,
    pub mode: PumpMode,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            rate_hz: 30,
            n_samples: 1000,
            mode: PumpMode::Threaded,
        }
    }
}

impl PumpConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_hz == 0 {
            return Err(ConfigError::InvalidRate {
                rate_hz: self.rate_hz,
            });
        }
        if self.n_samples == 0 {
            return Err(ConfigError::InvalidSampleCount {
                count: self.n_samples,
            });
        }
        Ok(())
    }

    /// 刷新间隔
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz.max(1) as f64)
    }
}

/// 一次 tick 需要的全部共享状态
#[derive(Clone)]
struct TickContext {
    reader: SampleReader,
    buffer: Arc<Mutex<SampleBuffer>>,
    sink: Arc<dyn DisplaySink>,
    /// 复用的快照缓冲；持有该锁即串行化 tick
    scratch: Arc<Mutex<Vec<Sample>>>,
    ticks: Arc<AtomicU64>,
}

impl TickContext {
    fn tick(&self) -> usize {
        let mut scratch = self.scratch.lock();

        let samples = self.reader.drain();
        if samples.is_empty() {
            return 0;
        }

        {
            let mut buffer = self.buffer.lock();
            buffer.push(&samples);
            buffer.snapshot_into(&mut scratch);
        }

        // 显示回调在窗口锁之外执行
        self.sink.on_telemetry(&scratch);
        self.ticks.fetch_add(1, Ordering::Relaxed);
        trace!("Pump tick: {} new samples", samples.len());
        samples.len()
    }
}

/// 遥测泵
///
/// 拥有一个 [`Poller`]，`start()` 先启动轮询再启动定时器，`stop()` 先停定时器再停轮询。
pub struct TelemetryPump {
    poller: Poller,
    ctx: TickContext,
    config: PumpConfig,
    is_running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    last_service: Option<Instant>,
}

impl TelemetryPump {
    /// 创建遥测泵，窗口按配置新建
    pub fn new(
        poller: Poller,
        sink: Arc<dyn DisplaySink>,
        config: PumpConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let buffer = SampleBuffer::new(config.n_samples, poller.config().period);
        Self::with_buffer(poller, Arc::new(Mutex::new(buffer)), sink, config)
    }

    /// 创建遥测泵，使用调用方持有的窗口
    pub fn with_buffer(
        poller: Poller,
        buffer: Arc<Mutex<SampleBuffer>>,
        sink: Arc<dyn DisplaySink>,
        config: PumpConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let ctx = TickContext {
            reader: poller.reader(),
            buffer,
            sink,
            scratch: Arc::new(Mutex::new(Vec::with_capacity(config.n_samples))),
            ticks: Arc::new(AtomicU64::new(0)),
        };

        Ok(Self {
            poller,
            ctx,
            config,
            is_running: Arc::new(AtomicBool::new(false)),
            thread: None,
            last_service: None,
        })
    }

    /// 启动轮询与定时器
    pub fn start(&mut self, device: SharedDevice, register: Register) -> Result<(), DriverError> {
        self.poller.start(device, register)?;

        if self.config.mode == PumpMode::Threaded && self.thread.is_none() {
            self.is_running.store(true, Ordering::Release);
            let ctx = self.ctx.clone();
            let is_running = self.is_running.clone();
            let interval = self.config.interval();

            let spawned = thread::Builder::new()
                .name("scope-pump".into())
                .spawn(move || timer_loop(ctx, is_running, interval));

            match spawned {
                Ok(handle) => self.thread = Some(handle),
                Err(e) => {
                    self.is_running.store(false, Ordering::Release);
                    self.poller.stop();
                    return Err(DriverError::ThreadSpawn(e));
                },
            }
        }

        self.last_service = Some(Instant::now());
        debug!(
            "Telemetry pump started ({} Hz, {:?})",
            self.config.rate_hz, self.config.mode
        );
        Ok(())
    }

    /// 停止定时器，然后停止轮询（同步）
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            error!("Pump thread panicked");
        }
        self.poller.stop();
        self.last_service = None;
    }

    /// 立即执行一次：取点、推入窗口、通知显示端
    ///
    /// 返回本次取到的采样点数；为 0 时不推入也不通知。
    pub fn tick(&self) -> usize {
        self.ctx.tick()
    }

    /// 协作模式：距上次执行超过刷新间隔时执行一次 tick
    ///
    /// 线程模式或未启动时返回 0。
    pub fn service(&mut self) -> usize {
        if self.config.mode != PumpMode::Cooperative {
            return 0;
        }
        let Some(last) = self.last_service else {
            return 0;
        };
        if last.elapsed() < self.config.interval() {
            return 0;
        }
        self.last_service = Some(Instant::now());
        self.tick()
    }

    pub fn is_running(&self) -> bool {
        self.poller.is_running()
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn buffer(&self) -> Arc<Mutex<SampleBuffer>> {
        self.ctx.buffer.clone()
    }

    /// 向显示端推送过的快照数
    pub fn tick_count(&self) -> u64 {
        self.ctx.ticks.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &PumpConfig {
        &self.config
    }
}

impl Drop for TelemetryPump {
    fn drop(&mut self) {
        self.stop();
    }
}

fn timer_loop(ctx: TickContext, is_running: Arc<AtomicBool>, interval: Duration) {
    let mut next_tick = Instant::now() + interval;

    while is_running.load(Ordering::Acquire) {
        let now = Instant::now();
        if next_tick > now {
            spin_sleep::sleep(next_tick - now);
        } else {
            warn!(
                "Pump overrun: tick was {:?} late (interval {:?}), resetting anchor",
                now.duration_since(next_tick),
                interval
            );
            next_tick = now;
        }

        if !is_running.load(Ordering::Acquire) {
            break;
        }
        ctx.tick();
        next_tick += interval;
    }
    trace!("Pump timer thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::PollerConfig;
    use crate::sink::{ChannelSink, NullSink, SinkEvent};
    use scope_device::MockDevice;
    use scope_protocol::POS_ACTUAL;

    fn cooperative(n_samples: usize) -> PumpConfig {
        PumpConfig {
            rate_hz: 30,
            n_samples,
            mode: PumpMode::Cooperative,
        }
    }

    fn idle_poller() -> Poller {
        // 周期足够长，测试期间采样线程不会读取
        Poller::new(PollerConfig {
            period: Duration::from_secs(60),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(PumpConfig::default().validate().is_ok());
        assert_eq!(
            PumpConfig {
                rate_hz: 0,
                ..Default::default()
            }
            .validate(),
            Err(ConfigError::InvalidRate { rate_hz: 0 })
        );
        assert_eq!(
            PumpConfig {
                n_samples: 0,
                ..Default::default()
            }
            .validate(),
            Err(ConfigError::InvalidSampleCount { count: 0 })
        );
    }

    #[test]
    fn test_tick_pushes_and_notifies() {
        let (sink, rx) = ChannelSink::new(16);
        let pump = TelemetryPump::new(idle_poller(), Arc::new(sink), cooperative(1000)).unwrap();

        let writer = pump.poller().writer();
        let incoming: Vec<Sample> =
            (1..=5).map(|i| Sample::new(i as f64 * 0.01, i as f64)).collect();
        for sample in &incoming {
            writer.push(*sample);
        }

        assert_eq!(pump.tick(), 5);
        let Ok(SinkEvent::Telemetry(snapshot)) = rx.try_recv() else {
            panic!("expected telemetry event");
        };
        assert_eq!(snapshot.len(), 1000);
        assert_eq!(&snapshot[995..], incoming.as_slice());
        assert_eq!(pump.tick_count(), 1);
    }

    #[test]
    fn test_empty_tick_does_nothing() {
        let (sink, rx) = ChannelSink::new(16);
        let pump = TelemetryPump::new(idle_poller(), Arc::new(sink), cooperative(10)).unwrap();
        let before = pump.buffer().lock().snapshot();

        assert_eq!(pump.tick(), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(pump.buffer().lock().snapshot(), before);
        assert_eq!(pump.tick_count(), 0);
    }

    #[test]
    fn test_threaded_pump_delivers_snapshots() {
        let device = Arc::new(MockDevice::new());
        device.set_register_value(&POS_ACTUAL, 3.0);

        let poller = Poller::new(PollerConfig {
            period: Duration::from_millis(2),
            ..Default::default()
        })
        .unwrap();
        let (sink, rx) = ChannelSink::new(64);
        let mut pump = TelemetryPump::new(
            poller,
            Arc::new(sink),
            PumpConfig {
                rate_hz: 100,
                n_samples: 50,
                mode: PumpMode::Threaded,
            },
        )
        .unwrap();

        pump.start(device.clone(), POS_ACTUAL).unwrap();
        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        pump.stop();

        let SinkEvent::Telemetry(snapshot) = event else {
            panic!("expected telemetry event");
        };
        assert_eq!(snapshot.len(), 50);
        assert_eq!(snapshot.last().map(|s| s.value), Some(3.0));
        assert!(!pump.is_running());

        let reads = device.read_count();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(device.read_count(), reads);
    }

    #[test]
    fn test_service_respects_interval() {
        let device = Arc::new(MockDevice::new());
        let mut pump =
            TelemetryPump::new(idle_poller(), Arc::new(NullSink), cooperative(10)).unwrap();

        // 未启动
        assert_eq!(pump.service(), 0);

        pump.start(device, POS_ACTUAL).unwrap();
        pump.poller().writer().push(Sample::new(0.01, 1.0));
        // 刚启动，未到刷新间隔
        assert_eq!(pump.service(), 0);

        thread::sleep(pump.config().interval() + Duration::from_millis(5));
        assert_eq!(pump.service(), 1);
        assert_eq!(pump.buffer().lock().latest(), Some(Sample::new(0.01, 1.0)));
        pump.stop();
    }

    #[test]
    fn test_shared_buffer() {
        let buffer = Arc::new(Mutex::new(SampleBuffer::new(8, Duration::from_millis(10))));
        let pump = TelemetryPump::with_buffer(
            idle_poller(),
            buffer.clone(),
            Arc::new(NullSink),
            cooperative(8),
        )
        .unwrap();
        pump.poller().writer().push(Sample::new(0.5, 9.0));
        pump.tick();
        assert_eq!(buffer.lock().latest(), Some(Sample::new(0.5, 9.0)));
    }
}
