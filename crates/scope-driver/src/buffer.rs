//! 滚动采样窗口
//!
//! 固定长度 N 的时间序列窗口。初始化（`reset`）时用 N 个零值占位点填满，
//! 时间戳为 `-N·Ts, -(N-1)·Ts, …, -Ts`，保证显示端从第一帧起就有稳定的横轴范围。
//! 之后每推入 M 个采样点，就丢弃最旧的 M 个。

use scope_protocol::Sample;
use std::collections::VecDeque;
use std::time::Duration;

/// 固定长度滚动窗口
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
    period: Duration,
}

impl SampleBuffer {
    /// 创建并立即填充占位点
    ///
    /// `period` 为采样周期 Ts，仅用于生成占位点的时间戳。
    pub fn new(capacity: usize, period: Duration) -> Self {
        let mut buffer = Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            period,
        };
        buffer.reset();
        buffer
    }

    /// 重新填充 N 个零值占位点
    pub fn reset(&mut self) {
        let ts = self.period.as_secs_f64();
        let n = self.capacity;
        self.samples.clear();
        self.samples
            .extend((0..n).map(|i| Sample::new(-((n - i) as f64) * ts, 0.0)));
    }

    /// 追加采样点，丢弃同等数量的最旧点
    ///
    /// 若一次推入超过 N 个点，只保留最后 N 个。
    pub fn push(&mut self, samples: &[Sample]) {
        let tail = if samples.len() > self.capacity {
            &samples[samples.len() - self.capacity..]
        } else {
            samples
        };

        for sample in tail {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(*sample);
        }
    }

    /// 按时间顺序导出全部 N 个点
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    /// 导出到已有 Vec（复用分配）
    pub fn snapshot_into(&self, out: &mut Vec<Sample>) {
        out.clear();
        out.extend(self.samples.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 最新的采样点
    pub fn latest(&self) -> Option<Sample> {
        self.samples.back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_reset_primes_placeholders() {
        let buffer = SampleBuffer::new(4, Duration::from_millis(10));
        let snapshot = buffer.snapshot();

        assert_eq!(snapshot.len(), 4);
        let times: Vec<f64> = snapshot.iter().map(|s| s.time).collect();
        let expected = [-0.04, -0.03, -0.02, -0.01];
        for (t, e) in times.iter().zip(expected.iter()) {
            assert!(approx_eq(*t, *e), "{} != {}", t, e);
        }
        assert!(snapshot.iter().all(|s| s.value == 0.0));
    }

    #[test]
    fn test_push_drops_oldest() {
        let mut buffer = SampleBuffer::new(1000, Duration::from_millis(10));
        let incoming: Vec<Sample> =
            (1..=5).map(|i| Sample::new(i as f64 * 0.01, i as f64)).collect();
        buffer.push(&incoming);

        assert_eq!(buffer.len(), 1000);
        let snapshot = buffer.snapshot();
        assert_eq!(&snapshot[995..], incoming.as_slice());
        assert_eq!(buffer.latest(), Some(Sample::new(0.05, 5.0)));
        // 最旧的 5 个占位点被移除
        assert!(approx_eq(snapshot[0].time, -9.95));
    }

    #[test]
    fn test_push_more_than_capacity() {
        let mut buffer = SampleBuffer::new(3, Duration::from_millis(10));
        let incoming: Vec<Sample> = (0..10).map(|i| Sample::new(i as f64, i as f64)).collect();
        buffer.push(&incoming);

        assert_eq!(buffer.snapshot(), incoming[7..].to_vec());
    }

    #[test]
    fn test_reset_after_push() {
        let mut buffer = SampleBuffer::new(8, Duration::from_millis(10));
        buffer.push(&[Sample::new(1.0, 42.0)]);
        buffer.reset();

        assert_eq!(buffer.len(), 8);
        assert!(buffer.snapshot().iter().all(|s| s.value == 0.0));
        assert!(approx_eq(buffer.latest().unwrap().time, -0.01));
    }

    #[test]
    fn test_push_empty_is_noop() {
        let mut buffer = SampleBuffer::new(5, Duration::from_millis(10));
        let before = buffer.snapshot();
        buffer.push(&[]);
        assert_eq!(buffer.snapshot(), before);
    }

    proptest! {
        // 任意次 push 之后长度恒为 N，且新点按推入顺序位于尾部
        #[test]
        fn prop_length_and_order(
            capacity in 1usize..64,
            batches in prop::collection::vec(prop::collection::vec(-1.0e3f64..1.0e3, 0..20), 0..20),
        ) {
            let mut buffer = SampleBuffer::new(capacity, Duration::from_millis(10));
            let mut all = Vec::new();
            let mut t = 0.0;

            for batch in &batches {
                let samples: Vec<Sample> = batch
                    .iter()
                    .map(|v| {
                        t += 0.01;
                        Sample::new(t, *v)
                    })
                    .collect();
                buffer.push(&samples);
                all.extend(samples);
                prop_assert_eq!(buffer.len(), capacity);
            }

            let snapshot = buffer.snapshot();
            let keep = all.len().min(capacity);
            prop_assert_eq!(&snapshot[capacity - keep..], &all[all.len() - keep..]);
        }
    }
}
