//! Acceptance tests for the PPS generator.
//!
//! Most of the suite drives the full calibrate / arm / cycle / rearm
//! pipeline against the deterministic simulated timeline, asserting
//! nanosecond-exact edge placement. One smoke test runs against the real
//! clock and is ignored by default.

mod acceptance;
