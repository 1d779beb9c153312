//! 终端显示端

use parking_lot::Mutex;
use scope_driver::DisplaySink;
use scope_protocol::{AxisState, Channel, Sample};
use std::sync::atomic::{AtomicU64, Ordering};

const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// 终端显示端
///
/// 状态与状态文本直接打印；遥测只保存最新快照，由 `plot` 命令按需绘制。
#[derive(Default)]
pub struct TerminalSink {
    latest: Mutex<Vec<Sample>>,
    frames: AtomicU64,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最近一次收到的快照
    pub fn latest_snapshot(&self) -> Vec<Sample> {
        self.latest.lock().clone()
    }

    /// 收到的遥测帧数
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl DisplaySink for TerminalSink {
    fn on_telemetry(&self, snapshot: &[Sample]) {
        let mut latest = self.latest.lock();
        latest.clear();
        latest.extend_from_slice(snapshot);
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    fn on_status_message(&self, message: &str) {
        println!("📣 {}", message);
    }

    fn on_state_changed(&self, state: AxisState) {
        println!("🔄 {}", state);
    }
}

/// 窗口统计（只统计真实采样点，不含占位点）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

pub fn window_stats(samples: &[Sample]) -> Option<WindowStats> {
    let real: Vec<f64> = samples
        .iter()
        .filter(|s| s.time >= 0.0)
        .map(|s| s.value)
        .collect();
    if real.is_empty() {
        return None;
    }

    let min = real.iter().copied().fold(f64::INFINITY, f64::min);
    let max = real.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = real.iter().sum::<f64>() / real.len() as f64;
    Some(WindowStats {
        count: real.len(),
        min,
        max,
        mean,
    })
}

/// 把窗口压缩成 `width` 列的迷你折线
///
/// 每列取对应区间的均值，按 `(lo, hi)` 映射到 8 个字符高度，超出范围的值被截断。
pub fn sparkline(samples: &[Sample], width: usize, (lo, hi): (f64, f64)) -> String {
    if samples.is_empty() || width == 0 || hi <= lo {
        return String::new();
    }

    let columns = width.min(samples.len());
    let span = hi - lo;
    (0..columns)
        .map(|col| {
            let start = col * samples.len() / columns;
            let end = ((col + 1) * samples.len() / columns).max(start + 1);
            let chunk = &samples[start..end];
            let mean = chunk.iter().map(|s| s.value).sum::<f64>() / chunk.len() as f64;
            let ratio = ((mean - lo) / span).clamp(0.0, 1.0);
            let level = (ratio * (LEVELS.len() - 1) as f64).round() as usize;
            LEVELS[level]
        })
        .collect()
}

/// 带标题的绘图文本
pub fn render_plot(channel: Channel, samples: &[Sample], range: (f64, f64), width: usize) -> String {
    let mut out = format!("{}  [{:.0}, {:.0}]", channel, range.0, range.1);
    if let Some(stats) = window_stats(samples) {
        out.push_str(&format!(
            "  n={} min={:.2} max={:.2} mean={:.2}",
            stats.count, stats.min, stats.max, stats.mean
        ));
    }
    out.push('\n');
    out.push_str(&sparkline(samples, width, range));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparkline_levels() {
        let samples: Vec<Sample> = (0..8).map(|i| Sample::new(i as f64, i as f64)).collect();
        assert_eq!(sparkline(&samples, 8, (0.0, 7.0)), "▁▂▃▄▅▆▇█");
    }

    #[test]
    fn test_sparkline_downsamples_and_clamps() {
        let samples: Vec<Sample> = (0..100).map(|i| Sample::new(i as f64, 1000.0)).collect();
        let line = sparkline(&samples, 10, (-50.0, 50.0));
        assert_eq!(line.chars().count(), 10);
        assert!(line.chars().all(|c| c == '█'));
        assert!(sparkline(&samples, 10, (1.0, 1.0)).is_empty());
    }

    #[test]
    fn test_window_stats_skip_placeholders() {
        let samples = vec![
            Sample::new(-0.02, 0.0),
            Sample::new(-0.01, 0.0),
            Sample::new(0.01, 2.0),
            Sample::new(0.02, 4.0),
        ];
        let stats = window_stats(&samples).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.mean, 3.0);
        assert!(window_stats(&samples[..2]).is_none());
    }

    #[test]
    fn test_terminal_sink_keeps_latest() {
        let sink = TerminalSink::new();
        sink.on_telemetry(&[Sample::new(0.1, 1.0)]);
        sink.on_telemetry(&[Sample::new(0.2, 2.0), Sample::new(0.3, 3.0)]);
        assert_eq!(sink.latest_snapshot().len(), 2);
        assert_eq!(sink.frame_count(), 2);
    }
}
