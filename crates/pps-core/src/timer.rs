//! Absolute wake-up timer.
//!
//! The cycle controller owns an explicit rearm loop: it computes the next
//! expiry, blocks here until that instant, then runs one cycle. The timer
//! contract is at-or-after - a wake-up never happens before the requested
//! instant, which is what makes the wake delta non-negative by
//! construction.

use pps_common::time::Timestamp;

/// One-shot absolute wake-up service.
pub trait WakeupTimer {
    /// Block until at or after `deadline`. Returns immediately if the
    /// deadline has already passed.
    fn wait_until(&self, deadline: Timestamp);
}

/// Absolute sleep against the realtime clock.
///
/// Uses `clock_nanosleep(CLOCK_REALTIME, TIMER_ABSTIME)` so the expiry is
/// specified in wall-clock terms, the same timescale the edge-placement
/// math works in.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbsoluteSleepTimer;

#[cfg(target_os = "linux")]
impl WakeupTimer for AbsoluteSleepTimer {
    fn wait_until(&self, deadline: Timestamp) {
        #[allow(clippy::cast_possible_truncation)]
        let ts = libc::timespec {
            tv_sec: deadline.sec as libc::time_t,
            tv_nsec: deadline.nsec as libc::c_long,
        };

        loop {
            // SAFETY: clock_nanosleep is safe with a valid timespec; with
            // TIMER_ABSTIME the remain pointer is unused.
            let rc = unsafe {
                libc::clock_nanosleep(
                    libc::CLOCK_REALTIME,
                    libc::TIMER_ABSTIME,
                    &ts,
                    std::ptr::null_mut(),
                )
            };
            // Retry if a signal cut the sleep short; the deadline is
            // absolute so re-issuing cannot oversleep.
            if rc != libc::EINTR {
                return;
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl WakeupTimer for AbsoluteSleepTimer {
    fn wait_until(&self, deadline: Timestamp) {
        use crate::clock::{RealtimeClock, WallClock};

        let now = RealtimeClock.now();
        let remaining_ns = deadline.elapsed_since(now);
        if remaining_ns > 0 {
            #[allow(clippy::cast_sign_loss)]
            std::thread::sleep(std::time::Duration::from_nanos(remaining_ns as u64));
        }
    }
}
