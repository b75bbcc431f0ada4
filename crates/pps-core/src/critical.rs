//! Scoped protected sections around the timing-critical window.
//!
//! The whole design's accuracy rests on measuring elapsed wall-clock time
//! across the busy-wait loops without interruption. A userspace process
//! cannot disable interrupts, but it can get close: run under SCHED_FIFO
//! (see [`crate::realtime`]) and mask signal delivery for the duration of
//! the window so no handler steals time mid-measurement.
//!
//! The closure form guarantees the section is released on every exit path,
//! including the late-abort path.

/// Capability to run a closure without interruption by anything the host
/// environment lets us suppress.
pub trait Isolation {
    /// Run `f` inside the protected section.
    fn protect<R>(&self, f: impl FnOnce() -> R) -> R;
}

/// No suppression at all. For tests and simulated runs where the clock is
/// virtual and nothing can preempt the measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIsolation;

impl Isolation for NoIsolation {
    fn protect<R>(&self, f: impl FnOnce() -> R) -> R {
        f()
    }
}

/// Mask all signals for the duration of the closure.
///
/// Keeps SIGTERM/SIGINT handlers (and anything else deliverable to this
/// thread) from running inside the timing window; delivery is deferred
/// until the mask is restored, not lost.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalMaskIsolation;

#[cfg(unix)]
impl Isolation for SignalMaskIsolation {
    fn protect<R>(&self, f: impl FnOnce() -> R) -> R {
        use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow};

        let mut previous = SigSet::empty();
        let masked =
            pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::all()), Some(&mut previous))
                .is_ok();

        let result = f();

        if masked {
            let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&previous), None);
        }
        result
    }
}

/// Default isolation for the current platform.
#[cfg(unix)]
pub type DefaultIsolation = SignalMaskIsolation;

/// Default isolation for the current platform.
#[cfg(not(unix))]
pub type DefaultIsolation = NoIsolation;
