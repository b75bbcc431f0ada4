//! Integration tests for PPS generator acceptance testing.
//!
//! Covers:
//! - Steady-state edge placement and estimate convergence (simulated)
//! - Late-cycle behavior and recovery (simulated)
//! - Real-clock smoke test (ignored by default; needs a quiet host)

mod common;
mod late_cycle_test;
mod rt_smoke_test;
mod steady_state_test;
