//! Common utilities for the acceptance tests.
//!
//! The simulated harness uses fixed per-operation costs so every test in
//! the suite sees the same virtual timeline:
//! - clock read: 25ns (so busy-wait loops advance time)
//! - output write: 2µs (dominates the calibrated write latency)
//!
//! With a 25ns read bracketing each write, calibration measures exactly
//! 2025ns per trial.

#![allow(dead_code)] // Not every helper is used by every test file

use pps_common::config::GeneratorConfig;
use pps_common::time::{Timestamp, NSEC_PER_SEC};
use pps_core::critical::NoIsolation;
use pps_core::cycle::PulseGenerator;
use pps_core::sim::{Edge, SimClock, SimOutput, SimTimeline};

/// Virtual cost of one clock read.
pub const READ_COST_NS: i64 = 25;

/// Virtual cost of one output write.
pub const WRITE_COST_NS: i64 = 2_000;

/// Write latency the harness calibrates to (write plus trailing read).
pub const CALIBRATED_LATENCY_NS: i64 = WRITE_COST_NS + READ_COST_NS;

/// Generator type used throughout the simulated suite.
pub type SimGenerator = PulseGenerator<SimClock, SimOutput, NoIsolation>;

/// Build a timeline starting at `start_sec` and a generator wired to it,
/// using the default 30µs pulse width.
pub fn sim_harness(start_sec: i64) -> (SimTimeline, SimGenerator) {
    let sim = SimTimeline::new(Timestamp::new(start_sec, 0))
        .clock_read_cost(READ_COST_NS)
        .write_cost(WRITE_COST_NS);
    let config = GeneratorConfig::default();
    let generator = PulseGenerator::new(sim.clock(), sim.output(), NoIsolation, &config)
        .expect("default config is valid");
    (sim, generator)
}

/// Pulse edges recorded after the calibration writes.
pub fn pulse_edges(sim: &SimTimeline) -> Vec<Edge> {
    sim.edges()
        .into_iter()
        .skip(pps_core::CALIBRATION_TRIALS as usize)
        .collect()
}

/// Distance from an edge to the end of its second (positive = before the
/// upcoming boundary).
pub fn ns_before_boundary(edge: &Edge) -> i64 {
    NSEC_PER_SEC - edge.at.nsec
}
