use thiserror::Error;

/// PPS generator error types covering configuration, resource acquisition,
/// and lifecycle failures.
///
/// A missed output window is deliberately *not* an error: the cycle
/// controller reports it as a late outcome and keeps running, letting the
/// wake-error filter widen the margin on its own.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PpsError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Pulse width outside the supported range; the generator refuses to start.
    #[error("pulse width {requested_ns}ns exceeds maximum {max_ns}ns")]
    InvalidPulseWidth {
        /// Requested assert-to-deassert distance in nanoseconds.
        requested_ns: u64,
        /// Maximum supported distance in nanoseconds.
        max_ns: u64,
    },

    /// Output line unavailable or unwritable (fatal at start).
    #[error("output error: {0}")]
    Output(String),

    /// Clock source unreadable (fatal at start).
    #[error("clock error: {0}")]
    Clock(String),

    /// Generic runtime fault.
    #[error("runtime fault: {0}")]
    Fault(String),

    /// Invalid lifecycle transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

/// Convenience type alias for PPS generator operations.
pub type PpsResult<T> = Result<T, PpsError>;
