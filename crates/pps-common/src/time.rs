//! Wall-clock timestamps with nanosecond arithmetic.
//!
//! The edge-placement algorithm works in (seconds, nanoseconds-within-second)
//! form because the second boundary itself is the timing target. All
//! arithmetic stays in signed 64-bit nanoseconds; no floating point.

use std::fmt;

/// Nanoseconds per second.
pub const NSEC_PER_SEC: i64 = 1_000_000_000;

/// How much earlier than strictly necessary each wake-up is requested (ns).
///
/// Absorbs timing variance that neither the write-latency estimate nor the
/// wake-error filter models.
pub const SAFETY_INTERVAL_NS: i64 = 3_000;

/// A wall-clock instant split into whole seconds and nanoseconds.
///
/// Always normalized: `0 <= nsec < NSEC_PER_SEC`. Derived ordering is
/// therefore chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Whole seconds since the epoch.
    pub sec: i64,
    /// Nanoseconds within the second, `0..NSEC_PER_SEC`.
    pub nsec: i64,
}

impl Timestamp {
    /// Build a timestamp, normalizing `nsec` into `0..NSEC_PER_SEC` by
    /// carrying into the seconds field (in either direction).
    #[must_use]
    pub fn new(sec: i64, nsec: i64) -> Self {
        Self {
            sec: sec + nsec.div_euclid(NSEC_PER_SEC),
            nsec: nsec.rem_euclid(NSEC_PER_SEC),
        }
    }

    /// Build a timestamp from total nanoseconds since the epoch.
    #[must_use]
    pub fn from_ns(total_ns: i64) -> Self {
        Self::new(0, total_ns)
    }

    /// Total nanoseconds since the epoch.
    #[must_use]
    pub fn as_ns(&self) -> i64 {
        self.sec * NSEC_PER_SEC + self.nsec
    }

    /// Signed nanoseconds elapsed since `earlier`.
    ///
    /// Negative when `self` precedes `earlier`.
    #[must_use]
    pub fn elapsed_since(&self, earlier: Timestamp) -> i64 {
        (self.sec - earlier.sec) * NSEC_PER_SEC + (self.nsec - earlier.nsec)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}
