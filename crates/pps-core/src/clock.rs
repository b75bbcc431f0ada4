//! Wall-clock reading and the busy-wait spin primitive.
//!
//! The clock must have wall-clock semantics (a physical second boundary is
//! meaningful) and be cheap enough to poll in a tight loop. On Linux that
//! is `clock_gettime(CLOCK_REALTIME)`, well under a microsecond per read
//! on current hardware.

use pps_common::time::Timestamp;

/// Source of wall-clock time for edge placement.
pub trait WallClock {
    /// Read the current wall-clock time.
    fn now(&self) -> Timestamp;
}

/// System realtime clock via `clock_gettime(CLOCK_REALTIME)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealtimeClock;

#[cfg(unix)]
impl WallClock for RealtimeClock {
    fn now(&self) -> Timestamp {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: clock_gettime with CLOCK_REALTIME and a valid out
        // pointer cannot fail on any supported platform.
        unsafe {
            libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts);
        }
        #[allow(clippy::useless_conversion)]
        Timestamp::new(i64::from(ts.tv_sec), i64::from(ts.tv_nsec))
    }
}

#[cfg(not(unix))]
impl WallClock for RealtimeClock {
    fn now(&self) -> Timestamp {
        let since_epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::new(
            i64::try_from(since_epoch.as_secs()).unwrap_or(i64::MAX),
            i64::from(since_epoch.subsec_nanos()),
        )
    }
}

/// Busy-poll `clock` until it reads at least `lim_nsec` within second `sec`,
/// or until the clock rolls into a different second.
///
/// Returns the final reading, which the caller uses as the
/// just-before-the-edge timestamp. This consumes CPU actively rather than
/// yielding; sub-microsecond edge placement is not achievable with a
/// sleeping wait.
pub fn spin_until<C: WallClock>(clock: &C, sec: i64, lim_nsec: i64) -> Timestamp {
    loop {
        let ts = clock.now();
        if ts.sec != sec || ts.nsec >= lim_nsec {
            return ts;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTimeline;
    use pps_common::time::NSEC_PER_SEC;

    #[test]
    fn test_realtime_clock_reads_normalized() {
        let clock = RealtimeClock;
        let ts = clock.now();
        assert!(ts.sec > 0);
        assert!((0..NSEC_PER_SEC).contains(&ts.nsec));
    }

    #[test]
    fn test_spin_until_reaches_limit() {
        let sim = SimTimeline::new(Timestamp::new(100, 0)).clock_read_cost(10);
        let clock = sim.clock();

        let ts = spin_until(&clock, 100, 5_000);
        assert_eq!(ts.sec, 100);
        assert!(ts.nsec >= 5_000);
        // Exit happens on the first read at or past the limit
        assert!(ts.nsec < 5_000 + 10);
    }

    #[test]
    fn test_spin_until_exits_on_second_rollover() {
        let sim = SimTimeline::new(Timestamp::new(100, NSEC_PER_SEC - 25)).clock_read_cost(10);
        let clock = sim.clock();

        // Limit can never be reached inside second 100; the rollover check
        // must break the loop.
        let ts = spin_until(&clock, 100, NSEC_PER_SEC);
        assert_eq!(ts.sec, 101);
    }
}
