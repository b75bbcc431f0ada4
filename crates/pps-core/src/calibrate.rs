//! Output write latency calibration.
//!
//! Runs once before the first cycle is armed. Each trial performs an
//! idempotent deassert write bracketed by two clock reads, inside a
//! protected section so unrelated work cannot inflate the sample. The
//! estimate is the truncated mean of all trials; the cycle controller
//! keeps refining it afterwards with a faster-moving average.

use crate::clock::WallClock;
use crate::critical::Isolation;
use crate::output::PulseOutput;
use tracing::info;

/// log2 of the number of calibration trials.
pub const CALIBRATION_SHIFT: u32 = 5;

/// Number of calibration trials.
pub const CALIBRATION_TRIALS: u32 = 1 << CALIBRATION_SHIFT;

/// Measure the output write latency in nanoseconds.
///
/// Leaves the line deasserted. The result is non-negative even on a clock
/// that misbehaves between the bracketing reads.
pub fn calibrate_write_latency<C, O, I>(clock: &C, output: &mut O, isolation: &I) -> i64
where
    C: WallClock,
    O: PulseOutput,
    I: Isolation,
{
    let mut acc: i64 = 0;
    for _ in 0..CALIBRATION_TRIALS {
        let (before, after) = isolation.protect(|| {
            let before = clock.now();
            output.set_level(false);
            (before, clock.now())
        });
        acc += after.elapsed_since(before).max(0);
    }

    let write_latency_ns = acc >> CALIBRATION_SHIFT;
    info!(write_latency_ns, "output write calibrated");
    write_latency_ns
}
