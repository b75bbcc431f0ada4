//! Timing metrics for wake-up jitter and pulse accounting.
//!
//! Provides a ring buffer-based histogram of per-cycle wake deltas
//! (how late each wake-up was relative to the requested instant)
//! without heap allocations during normal operation.

/// Per-cycle timing metrics with ring buffer for wake-delta tracking.
#[derive(Debug)]
pub struct TimingMetrics {
    /// Ring buffer of wake deltas in nanoseconds.
    samples: Box<[i64]>,
    /// Current write position in the ring buffer.
    write_pos: usize,
    /// Number of samples collected (saturates at buffer size).
    sample_count: usize,
    /// Total cycles observed (emitted and late).
    total_cycles: u64,
    /// Pulses actually emitted.
    pulses_emitted: u64,
    /// Cycles aborted by the lateness check.
    late_cycles: u64,
    /// Minimum observed wake delta in nanoseconds.
    min_ns: i64,
    /// Maximum observed wake delta in nanoseconds.
    max_ns: i64,
    /// Sum of all wake deltas for mean calculation.
    sum_ns: i64,
}

impl TimingMetrics {
    /// Create a new metrics collector retaining `histogram_size` wake deltas.
    #[must_use]
    pub fn new(histogram_size: usize) -> Self {
        let size = histogram_size.max(1);
        Self {
            samples: vec![0i64; size].into_boxed_slice(),
            write_pos: 0,
            sample_count: 0,
            total_cycles: 0,
            pulses_emitted: 0,
            late_cycles: 0,
            min_ns: i64::MAX,
            max_ns: 0,
            sum_ns: 0,
        }
    }

    /// Record the wake delta of one cycle (emitted or late).
    ///
    /// Allocation-free for use right after the protected timing window.
    pub fn record_wake_delta(&mut self, delta_ns: i64) {
        self.samples[self.write_pos] = delta_ns;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
        self.sample_count = self.sample_count.saturating_add(1).min(self.samples.len());

        self.total_cycles += 1;
        self.min_ns = self.min_ns.min(delta_ns);
        self.max_ns = self.max_ns.max(delta_ns);
        self.sum_ns = self.sum_ns.wrapping_add(delta_ns);
    }

    /// Record an emitted pulse.
    pub fn record_pulse(&mut self) {
        self.pulses_emitted += 1;
    }

    /// Record a cycle aborted by the lateness check.
    pub fn record_late(&mut self) {
        self.late_cycles += 1;
    }

    /// Total cycles observed.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Pulses actually emitted.
    #[must_use]
    pub fn pulses_emitted(&self) -> u64 {
        self.pulses_emitted
    }

    /// Cycles aborted by the lateness check.
    #[must_use]
    pub fn late_cycles(&self) -> u64 {
        self.late_cycles
    }

    /// Minimum observed wake delta.
    #[must_use]
    pub fn min_ns(&self) -> Option<i64> {
        (self.total_cycles > 0).then_some(self.min_ns)
    }

    /// Maximum observed wake delta.
    #[must_use]
    pub fn max_ns(&self) -> Option<i64> {
        (self.total_cycles > 0).then_some(self.max_ns)
    }

    /// Mean wake delta.
    #[must_use]
    pub fn mean_ns(&self) -> Option<i64> {
        if self.total_cycles > 0 {
            Some(self.sum_ns / i64::try_from(self.total_cycles).unwrap_or(i64::MAX))
        } else {
            None
        }
    }

    /// Compute a wake-delta percentile from the ring buffer.
    ///
    /// Returns `None` if no samples have been collected or if `percentile`
    /// is out of range.
    #[must_use]
    pub fn percentile(&self, percentile: f64) -> Option<i64> {
        if self.sample_count == 0 {
            return None;
        }
        if !(0.0..=100.0).contains(&percentile) || percentile.is_nan() {
            return None;
        }

        let mut sorted: Vec<i64> = self.samples[..self.sample_count].to_vec();
        sorted.sort_unstable();

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let idx = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    /// Get a snapshot of current metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_cycles: self.total_cycles,
            pulses_emitted: self.pulses_emitted,
            late_cycles: self.late_cycles,
            min_wake_delta_ns: self.min_ns(),
            max_wake_delta_ns: self.max_ns(),
            mean_wake_delta_ns: self.mean_ns(),
            sample_count: self.sample_count,
        }
    }

    /// Reset all metrics to initial state.
    pub fn reset(&mut self) {
        self.samples.fill(0);
        self.write_pos = 0;
        self.sample_count = 0;
        self.total_cycles = 0;
        self.pulses_emitted = 0;
        self.late_cycles = 0;
        self.min_ns = i64::MAX;
        self.max_ns = 0;
        self.sum_ns = 0;
    }
}

/// Immutable snapshot of metrics for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Total cycles observed.
    pub total_cycles: u64,
    /// Pulses actually emitted.
    pub pulses_emitted: u64,
    /// Cycles aborted by the lateness check.
    pub late_cycles: u64,
    /// Minimum wake delta in nanoseconds.
    pub min_wake_delta_ns: Option<i64>,
    /// Maximum wake delta in nanoseconds.
    pub max_wake_delta_ns: Option<i64>,
    /// Mean wake delta in nanoseconds.
    pub mean_wake_delta_ns: Option<i64>,
    /// Number of samples in the histogram.
    pub sample_count: usize,
}

impl MetricsSnapshot {
    /// Wake-delta spread (max - min) in nanoseconds.
    #[must_use]
    pub fn jitter_ns(&self) -> Option<i64> {
        match (self.min_wake_delta_ns, self.max_wake_delta_ns) {
            (Some(min), Some(max)) => Some(max - min),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_recording() {
        let mut metrics = TimingMetrics::new(100);

        metrics.record_wake_delta(500);
        metrics.record_pulse();
        metrics.record_wake_delta(600);
        metrics.record_pulse();
        metrics.record_wake_delta(550);
        metrics.record_pulse();

        assert_eq!(metrics.total_cycles(), 3);
        assert_eq!(metrics.pulses_emitted(), 3);
        assert_eq!(metrics.min_ns(), Some(500));
        assert_eq!(metrics.max_ns(), Some(600));
        assert_eq!(metrics.mean_ns(), Some(550));
    }

    #[test]
    fn test_late_counting() {
        let mut metrics = TimingMetrics::new(100);

        metrics.record_wake_delta(900);
        metrics.record_pulse();
        metrics.record_wake_delta(45_000);
        metrics.record_late();
        metrics.record_wake_delta(800);
        metrics.record_pulse();

        assert_eq!(metrics.total_cycles(), 3);
        assert_eq!(metrics.pulses_emitted(), 2);
        assert_eq!(metrics.late_cycles(), 1);
    }

    #[test]
    fn test_percentile_calculation() {
        let mut metrics = TimingMetrics::new(100);

        for i in 1..=100 {
            metrics.record_wake_delta(i);
        }

        let p50 = metrics.percentile(50.0).unwrap();
        assert!((49..=51).contains(&p50));

        let p99 = metrics.percentile(99.0).unwrap();
        assert!((98..=100).contains(&p99));
    }

    #[test]
    fn test_percentile_validation() {
        let mut metrics = TimingMetrics::new(100);
        assert!(metrics.percentile(50.0).is_none());

        metrics.record_wake_delta(10);
        assert!(metrics.percentile(0.0).is_some());
        assert!(metrics.percentile(100.0).is_some());
        assert!(metrics.percentile(-1.0).is_none());
        assert!(metrics.percentile(101.0).is_none());
        assert!(metrics.percentile(f64::NAN).is_none());
    }

    #[test]
    fn test_ring_buffer_wrapping() {
        let mut metrics = TimingMetrics::new(10);

        for i in 0..25 {
            metrics.record_wake_delta(i * 1000);
        }

        assert_eq!(metrics.total_cycles(), 25);
        // Sample count is capped at buffer size
        assert_eq!(metrics.snapshot().sample_count, 10);
    }

    #[test]
    fn test_reset() {
        let mut metrics = TimingMetrics::new(100);

        metrics.record_wake_delta(500);
        metrics.record_late();

        metrics.reset();

        assert_eq!(metrics.total_cycles(), 0);
        assert_eq!(metrics.late_cycles(), 0);
        assert!(metrics.min_ns().is_none());
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut metrics = TimingMetrics::new(100);
        metrics.record_wake_delta(400);
        metrics.record_pulse();
        metrics.record_wake_delta(600);
        metrics.record_pulse();

        let snap = metrics.snapshot();
        assert_eq!(snap.jitter_ns(), Some(200));

        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"pulses_emitted\":2"));
    }
}
