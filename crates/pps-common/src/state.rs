//! Lifecycle state machine for the pulse generator.
//!
//! State transitions:
//! BOOT → CALIBRATE → ARMED → RUN → STOPPED
//!
//! Fault transitions are allowed from every pre-stop state so resource and
//! timing failures can be surfaced immediately; CALIBRATE is reachable from
//! FAULT to allow a restart with a fresh latency estimate.

use crate::error::{PpsError, PpsResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a pulse generator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeneratorState {
    /// Initial state; output line and clock not yet validated.
    #[default]
    Boot,
    /// Measuring output write latency.
    Calibrate,
    /// Calibrated; first expiry computed, no pulse emitted yet.
    Armed,
    /// Emitting one pulse per second.
    Run,
    /// Fault detected; output level undefined.
    Fault,
    /// Stopped; output deasserted, no further cycles scheduled.
    Stopped,
}

impl fmt::Display for GeneratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boot => write!(f, "BOOT"),
            Self::Calibrate => write!(f, "CALIBRATE"),
            Self::Armed => write!(f, "ARMED"),
            Self::Run => write!(f, "RUN"),
            Self::Fault => write!(f, "FAULT"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

impl GeneratorState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: GeneratorState) -> bool {
        use GeneratorState::{Armed, Boot, Calibrate, Fault, Run, Stopped};

        matches!(
            (self, target),
            // Normal forward progression
            (Boot, Calibrate)
                | (Calibrate, Armed)
                | (Armed, Run)
                // Fault transitions
                | (Boot, Fault)
                | (Calibrate, Fault)
                | (Armed, Fault)
                | (Run, Fault)
                // Stop from run, armed, or fault
                | (Run, Stopped)
                | (Armed, Stopped)
                | (Fault, Stopped)
                // Recovery: fault -> calibrate to retry with a fresh estimate
                | (Fault, Calibrate)
        )
    }

    /// Returns true if the generator is actively placing edges.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Armed | Self::Run)
    }

    /// Returns true if the generator is in a fault or stopped state.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Fault | Self::Stopped)
    }
}

/// State machine wrapper with transition history tracking.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: GeneratorState,
    previous: Option<GeneratorState>,
    transition_count: u64,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine starting in BOOT.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: GeneratorState::Boot,
            previous: None,
            transition_count: 0,
        }
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> GeneratorState {
        self.current
    }

    /// Get the previous state (if any transition occurred).
    #[must_use]
    pub fn previous_state(&self) -> Option<GeneratorState> {
        self.previous
    }

    /// Get total number of transitions.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Attempt a state transition.
    pub fn transition(&mut self, target: GeneratorState) -> PpsResult<()> {
        if self.current.can_transition_to(target) {
            self.previous = Some(self.current);
            self.current = target;
            self.transition_count += 1;
            Ok(())
        } else {
            Err(PpsError::InvalidStateTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Force a transition to FAULT (succeeds from every pre-stop state).
    pub fn enter_fault(&mut self) {
        if self.current.can_transition_to(GeneratorState::Fault) {
            self.previous = Some(self.current);
            self.current = GeneratorState::Fault;
            self.transition_count += 1;
        }
    }
}
