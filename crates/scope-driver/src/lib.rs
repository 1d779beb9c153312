//! 驱动层模块
//!
//! 本模块提供单轴伺服遥测的线程化组件，包括：
//! - 寄存器轮询线程（固定周期采样，有界队列，满时丢最旧）
//! - 遥测泵（显示刷新率取点，推入滚动窗口，通知显示端）
//! - 滚动采样窗口（固定长度 N，零值占位）
//! - 显示端接口（`DisplaySink`）
//!
//! # 使用场景
//!
//! 大多数用户应该使用 `scope-client` 提供的状态机，由它负责启动和停止这些组件。

pub mod buffer;
mod error;
pub mod poller;
pub mod pump;
pub mod sink;

pub use buffer::SampleBuffer;
pub use error::{ConfigError, DriverError};
pub use poller::{FaultHandler, Poller, PollerConfig, PollerFault, SampleReader, SampleWriter};
pub use pump::{PumpConfig, PumpMode, TelemetryPump};
pub use sink::{ChannelSink, DisplaySink, NullSink, SinkEvent};
