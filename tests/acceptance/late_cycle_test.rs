//! Late-cycle acceptance tests.
//!
//! A wake-up that arrives too late to place the edges correctly must skip
//! the pulse for that second, widen the margin immediately, and recover
//! on the next cycle. These tests inject wake-latency spikes into the
//! simulated timeline and assert the skip/recover behavior exactly.

use super::common::{pulse_edges, sim_harness};
use pps_core::cycle::CycleOutcome;
use pps_core::timer::WakeupTimer;

#[test]
fn test_spike_skips_exactly_one_pulse() {
    let (sim, mut gen) = sim_harness(1_000);
    let timer = sim.timer();

    gen.calibrate().expect("calibration from BOOT");
    gen.arm().expect("arm after calibration");

    // Ten clean cycles first
    for _ in 0..10 {
        timer.wait_until(gen.next_expiry());
        gen.run_cycle().expect("cycle in RUN state");
    }

    // One 40µs spike: still inside the right second, but past the point
    // where the assert edge could be placed correctly
    sim.set_wake_latency(40_000);
    timer.wait_until(gen.next_expiry());
    let outcome = gen.run_cycle().expect("late cycle still succeeds");
    sim.set_wake_latency(0);

    let CycleOutcome::Late { wake_delta_ns, .. } = outcome else {
        panic!("expected Late outcome, got {outcome:?}");
    };
    assert_eq!(wake_delta_ns, 40_025);

    // Ten more clean cycles
    for _ in 0..10 {
        timer.wait_until(gen.next_expiry());
        let outcome = gen.run_cycle().expect("cycle in RUN state");
        assert!(
            matches!(outcome, CycleOutcome::Emitted { .. }),
            "cycle after the spike must emit"
        );
    }

    let metrics = gen.metrics();
    assert_eq!(metrics.total_cycles(), 21);
    assert_eq!(metrics.pulses_emitted(), 20);
    assert_eq!(metrics.late_cycles(), 1);

    // The skipped second has no edges at all
    let edges = pulse_edges(&sim);
    assert_eq!(edges.len(), 40);
    let skipped_sec = 1_000 + 10;
    assert!(edges.iter().all(|e| e.at.sec != skipped_sec));
}

#[test]
fn test_spike_widens_margin_immediately() {
    let (sim, mut gen) = sim_harness(1_000);
    let timer = sim.timer();

    gen.calibrate().expect("calibration from BOOT");
    gen.arm().expect("arm after calibration");

    timer.wait_until(gen.next_expiry());
    gen.run_cycle().expect("first cycle");
    let margin_before = gen.next_expiry();

    sim.set_wake_latency(40_000);
    timer.wait_until(gen.next_expiry());
    gen.run_cycle().expect("late cycle");
    sim.set_wake_latency(0);

    // The filter adopted the spike as the new worst case...
    assert_eq!(gen.wake_error_ns(), 40_025);

    // ...so the next wake-up is requested correspondingly earlier within
    // its second: twice the wake-error increase, per the rearm margin.
    let margin_after = gen.next_expiry();
    let error_increase = 40_025 - 2_256; // spike minus the previous estimate
    assert_eq!(
        margin_before.nsec - margin_after.nsec,
        2 * error_increase
    );
}

#[test]
fn test_wake_in_wrong_second_skips() {
    let (sim, mut gen) = sim_harness(1_000);
    let timer = sim.timer();

    gen.calibrate().expect("calibration from BOOT");
    gen.arm().expect("arm after calibration");

    // Over a full second of latency: the target second is gone entirely
    sim.set_wake_latency(1_100_000_000);
    timer.wait_until(gen.next_expiry());
    let outcome = gen.run_cycle().expect("late cycle still succeeds");

    assert!(matches!(outcome, CycleOutcome::Late { .. }));
    assert!(pulse_edges(&sim).is_empty());
    assert_eq!(gen.metrics().late_cycles(), 1);
}

#[test]
fn test_margin_decays_back_after_spike() {
    let (sim, mut gen) = sim_harness(1_000);
    let timer = sim.timer();

    gen.calibrate().expect("calibration from BOOT");
    gen.arm().expect("arm after calibration");

    sim.set_wake_latency(40_000);
    timer.wait_until(gen.next_expiry());
    gen.run_cycle().expect("late cycle");
    sim.set_wake_latency(0);

    assert_eq!(gen.wake_error_ns(), 40_025);

    // Quiet cycles pull the estimate back down, a quarter of the distance
    // at a time, until it reaches the steady observed delta.
    let mut previous = gen.wake_error_ns();
    for _ in 0..60 {
        timer.wait_until(gen.next_expiry());
        gen.run_cycle().expect("cycle in RUN state");
        assert!(gen.wake_error_ns() <= previous);
        previous = gen.wake_error_ns();
    }
    assert_eq!(gen.wake_error_ns(), 25);
}
