//! 显示端接口
//!
//! 遥测泵和状态机通过 [`DisplaySink`] 把数据推给显示端。所有回调都可能在
//! 后台线程中执行，实现者**不得阻塞**。
//!
//! # 示例
//!
//! ```rust
//! use scope_driver::sink::{ChannelSink, DisplaySink, SinkEvent};
//! use scope_protocol::AxisState;
//!
//! let (sink, rx) = ChannelSink::new(16);
//! sink.on_state_changed(AxisState::Idle);
//! assert!(matches!(rx.try_recv(), Ok(SinkEvent::StateChanged(AxisState::Idle))));
//! ```

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use scope_protocol::{AxisState, Sample};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// 显示端能力
pub trait DisplaySink: Send + Sync {
    /// 新一帧遥测快照（N 个点，按时间顺序）
    fn on_telemetry(&self, snapshot: &[Sample]);

    /// 状态文本（如 "Running..."、"Finished"、"Error: ..."）
    fn on_status_message(&self, message: &str);

    /// 轴状态变化
    fn on_state_changed(&self, state: AxisState);
}

impl<S: DisplaySink + ?Sized> DisplaySink for Arc<S> {
    fn on_telemetry(&self, snapshot: &[Sample]) {
        (**self).on_telemetry(snapshot)
    }

    fn on_status_message(&self, message: &str) {
        (**self).on_status_message(message)
    }

    fn on_state_changed(&self, state: AxisState) {
        (**self).on_state_changed(state)
    }
}

/// 丢弃一切的显示端
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn on_telemetry(&self, _snapshot: &[Sample]) {}

    fn on_status_message(&self, _message: &str) {}

    fn on_state_changed(&self, _state: AxisState) {}
}

/// 显示事件
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Telemetry(Vec<Sample>),
    Status(String),
    StateChanged(AxisState),
}

/// 把回调转成 Channel 消息的显示端
///
/// 使用有界队列 + `try_send`，队列满时丢弃事件并计数，回调永不阻塞。
pub struct ChannelSink {
    tx: Sender<SinkEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    /// 创建显示端，返回 `(sink, rx)`
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<SinkEvent>) {
        let (tx, rx) = bounded(capacity);
        let sink = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sink, rx)
    }

    /// 因队列满而丢弃的事件数
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, event: SinkEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    warn!("Display sink queue full, {} events dropped so far", dropped);
                }
            },
            // 接收端已关闭，显示端不再存在
            Err(TrySendError::Disconnected(_)) => {},
        }
    }
}

impl DisplaySink for ChannelSink {
    fn on_telemetry(&self, snapshot: &[Sample]) {
        self.send(SinkEvent::Telemetry(snapshot.to_vec()));
    }

    fn on_status_message(&self, message: &str) {
        self.send(SinkEvent::Status(message.to_string()));
    }

    fn on_state_changed(&self, state: AxisState) {
        self.send(SinkEvent::StateChanged(state));
    }
}
