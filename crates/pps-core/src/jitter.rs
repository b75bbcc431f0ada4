//! Asymmetric filter tracking worst-case wake-up jitter.

/// Running estimate of how late a timer wake-up may be, in nanoseconds.
///
/// The filter is deliberately asymmetric. A new worst case is adopted
/// immediately, because under-margining risks a missed or mistimed edge;
/// good samples only pull the estimate down slowly, so a single quiet
/// cycle cannot erase the evidence of a loaded system. With a constant
/// input the decay branch converges to that constant (its fixed point).
#[derive(Debug, Clone)]
pub struct WakeJitterFilter {
    wake_error_ns: i64,
}

impl WakeJitterFilter {
    /// Create a filter seeded with `initial_ns` (clamped to non-negative).
    #[must_use]
    pub fn new(initial_ns: i64) -> Self {
        Self {
            wake_error_ns: initial_ns.max(0),
        }
    }

    /// Current worst-case wake error estimate.
    #[must_use]
    pub fn wake_error_ns(&self) -> i64 {
        self.wake_error_ns
    }

    /// Feed one observed wake delta (actual wake minus requested instant)
    /// and return the updated estimate.
    ///
    /// The delta is non-negative by the timer's at-or-after contract; a
    /// negative value is clamped to zero so the estimate can never go
    /// negative regardless of input.
    pub fn update(&mut self, delta_ns: i64) -> i64 {
        let delta = delta_ns.max(0);
        if delta >= self.wake_error_ns {
            self.wake_error_ns = delta;
        } else {
            self.wake_error_ns = (3 * self.wake_error_ns + delta) / 4;
        }
        self.wake_error_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rise_adopts_new_worst_case() {
        let mut filter = WakeJitterFilter::new(1_000);
        assert_eq!(filter.update(1_500), 1_500);
    }

    #[test]
    fn test_decay_moves_slowly() {
        let mut filter = WakeJitterFilter::new(1_000);
        // (3*1000 + 200) / 4 = 800, integer truncation
        assert_eq!(filter.update(200), 800);
    }

    #[test]
    fn test_decay_truncates() {
        let mut filter = WakeJitterFilter::new(1_001);
        // (3*1001 + 0) / 4 = 3003/4 = 750 (truncated)
        assert_eq!(filter.update(0), 750);
    }

    #[test]
    fn test_equal_delta_is_rise_branch() {
        let mut filter = WakeJitterFilter::new(1_000);
        assert_eq!(filter.update(1_000), 1_000);
    }

    #[test]
    fn test_never_negative() {
        let mut filter = WakeJitterFilter::new(-50);
        assert_eq!(filter.wake_error_ns(), 0);

        assert_eq!(filter.update(-200), 0);
        assert!(filter.wake_error_ns() >= 0);
    }

    #[test]
    fn test_constant_delta_is_fixed_point() {
        let mut filter = WakeJitterFilter::new(3_000);
        for _ in 0..64 {
            filter.update(25);
        }
        assert_eq!(filter.wake_error_ns(), 25);

        // Once there, it stays there
        assert_eq!(filter.update(25), 25);
    }
}
