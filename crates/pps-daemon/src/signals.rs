//! Signal handling for graceful daemon shutdown.
//!
//! Provides Unix signal handling (SIGTERM, SIGINT, SIGHUP) for clean
//! shutdown of the generator. The main loop spends almost all of its time
//! asleep or busy-waiting in the timing window, so handlers only flip
//! atomic flags; the loop checks them once per second, between cycles.
//! SIGHUP requests an on-demand status report rather than a config
//! reload - the timing estimates must not be reset mid-run.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Signal types the daemon handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGTERM - Graceful termination request.
    Terminate,
    /// SIGINT - Interrupt (Ctrl+C).
    Interrupt,
    /// SIGHUP - Hangup, repurposed as a status-report request.
    Hangup,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Terminate => write!(f, "SIGTERM"),
            SignalKind::Interrupt => write!(f, "SIGINT"),
            SignalKind::Hangup => write!(f, "SIGHUP"),
        }
    }
}

/// Shared state between the signal handlers and the main loop.
///
/// All fields use atomic operations for thread-safe access.
#[derive(Debug)]
pub struct SignalState {
    /// Set when a shutdown signal is received.
    shutdown_requested: AtomicBool,
    /// Set when a status report is requested.
    status_requested: AtomicBool,
    /// Count of signals received (for diagnostics).
    signal_count: AtomicU32,
    /// The most recent signal received.
    last_signal: AtomicU32,
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalState {
    /// Create a new signal state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shutdown_requested: AtomicBool::new(false),
            status_requested: AtomicBool::new(false),
            signal_count: AtomicU32::new(0),
            last_signal: AtomicU32::new(0),
        }
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Relaxed)
    }

    /// Check if a status report has been requested (and clear the flag).
    #[inline]
    pub fn take_status_request(&self) -> bool {
        self.status_requested.swap(false, Ordering::Relaxed)
    }

    /// Request shutdown (can be called from any thread).
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Relaxed);
    }

    /// Request a status report (can be called from any thread).
    pub fn request_status(&self) {
        self.status_requested.store(true, Ordering::Relaxed);
    }

    /// Record a signal.
    fn record_signal(&self, kind: SignalKind) {
        self.signal_count.fetch_add(1, Ordering::Relaxed);
        // Stored off-by-one so zero means "no signal yet"
        self.last_signal.store(kind as u32 + 1, Ordering::Relaxed);
    }

    /// Total number of signals received.
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }

    /// The most recent signal received, if any.
    pub fn last_signal(&self) -> Option<SignalKind> {
        match self.last_signal.load(Ordering::Relaxed) {
            1 => Some(SignalKind::Terminate),
            2 => Some(SignalKind::Interrupt),
            3 => Some(SignalKind::Hangup),
            _ => None,
        }
    }
}

/// Handle for signal management.
#[derive(Clone)]
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    /// Create a new signal handler and register OS handlers.
    ///
    /// On Unix this registers handlers for SIGTERM, SIGINT, and SIGHUP.
    /// On other platforms only manual shutdown is supported.
    ///
    /// # Errors
    ///
    /// Returns an error if handler registration fails.
    pub fn new() -> std::io::Result<Self> {
        let state = Arc::new(SignalState::new());
        let handler = Self {
            state: Arc::clone(&state),
        };

        #[cfg(unix)]
        handler.register_unix_handlers()?;

        Ok(handler)
    }

    /// Register Unix signal handlers.
    ///
    /// Handlers must be async-signal-safe, so they only flip static
    /// atomics; a low-priority poll thread forwards those into the shared
    /// state. The generator's timing window masks signal delivery, so a
    /// signal arriving mid-cycle is deferred to the next loop iteration
    /// anyway.
    #[cfg(unix)]
    fn register_unix_handlers(&self) -> std::io::Result<()> {
        use std::os::raw::c_int;

        static TERMINATE_FLAG: AtomicBool = AtomicBool::new(false);
        static INTERRUPT_FLAG: AtomicBool = AtomicBool::new(false);
        static STATUS_FLAG: AtomicBool = AtomicBool::new(false);

        let state = Arc::clone(&self.state);

        std::thread::spawn(move || loop {
            if TERMINATE_FLAG.swap(false, Ordering::Relaxed) {
                info!("Termination signal received");
                state.request_shutdown();
                state.record_signal(SignalKind::Terminate);
            }
            if INTERRUPT_FLAG.swap(false, Ordering::Relaxed) {
                info!("Interrupt signal received");
                state.request_shutdown();
                state.record_signal(SignalKind::Interrupt);
            }
            if STATUS_FLAG.swap(false, Ordering::Relaxed) {
                info!("Status report requested");
                state.request_status();
                state.record_signal(SignalKind::Hangup);
            }
            if state.shutdown_requested() {
                // Exit the poll thread once shutdown is underway
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        });

        extern "C" fn terminate_handler(_: c_int) {
            TERMINATE_FLAG.store(true, Ordering::Relaxed);
        }

        extern "C" fn interrupt_handler(_: c_int) {
            INTERRUPT_FLAG.store(true, Ordering::Relaxed);
        }

        extern "C" fn status_handler(_: c_int) {
            STATUS_FLAG.store(true, Ordering::Relaxed);
        }

        // SAFETY: the handlers only touch static atomics, which is
        // async-signal-safe; registration happens before any signal can
        // observe partially-built state.
        unsafe {
            libc::signal(libc::SIGTERM, terminate_handler as libc::sighandler_t);
            libc::signal(libc::SIGINT, interrupt_handler as libc::sighandler_t);
            libc::signal(libc::SIGHUP, status_handler as libc::sighandler_t);
        }

        debug!("Unix signal handlers registered");
        Ok(())
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.state.shutdown_requested()
    }

    /// Check if a status report has been requested (clears the flag).
    #[inline]
    pub fn take_status_request(&self) -> bool {
        self.state.take_status_request()
    }

    /// Manually request shutdown.
    pub fn request_shutdown(&self) {
        info!("Manual shutdown requested");
        self.state.request_shutdown();
    }

    /// The underlying signal state, for inspection.
    pub fn state(&self) -> &SignalState {
        &self.state
    }
}
