//! Per-second cycle controller.
//!
//! Each cycle wakes shortly before a second boundary, busy-waits the
//! assert edge into place `pulse_width` before the boundary, busy-waits
//! the deassert edge onto the boundary itself, then refines the latency
//! and jitter estimates and computes the next wake instant. A wake-up
//! that arrives too late to place the edges correctly skips the pulse
//! entirely for that second.
//!
//! Known limitation, inherited from the algorithm's design: the rearm
//! computation assumes the wall clock advances by exactly one second per
//! cycle. If the clock is stepped during operation (external time
//! synchronization, leap handling), behavior is undefined until the step
//! settles. The correct policy - resync, abort, or ignore - is an open
//! question, deliberately not decided here.

use crate::calibrate::calibrate_write_latency;
use crate::clock::{spin_until, WallClock};
use crate::critical::Isolation;
use crate::jitter::WakeJitterFilter;
use crate::output::PulseOutput;
use pps_common::config::GeneratorConfig;
use pps_common::error::{PpsError, PpsResult};
use pps_common::metrics::TimingMetrics;
use pps_common::state::{GeneratorState, StateMachine};
use pps_common::time::{Timestamp, NSEC_PER_SEC, SAFETY_INTERVAL_NS};
use tracing::{debug, info, warn};

/// Result of a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Both edges were placed.
    Emitted {
        /// How late the wake-up was relative to the requested instant (ns).
        wake_delta_ns: i64,
        /// Write latency estimate after this cycle's refinement (ns).
        write_latency_ns: i64,
        /// Wake error estimate after this cycle's filter update (ns).
        wake_error_ns: i64,
    },
    /// The wake-up came too late; no edges were emitted this second.
    Late {
        /// The observed wake time.
        wake: Timestamp,
        /// How late the wake-up was relative to the requested instant (ns).
        wake_delta_ns: i64,
    },
}

/// What happened inside the protected timing window.
enum Fired {
    Emitted {
        t1: Timestamp,
        t2: Timestamp,
        t3: Timestamp,
    },
    Late {
        t1: Timestamp,
    },
}

/// One pulse-per-second generator bound to a single output line.
///
/// Owns all calibration state; independent output lines get independent
/// instances. All mutation happens on the thread driving
/// [`run_cycle`](Self::run_cycle) - there is no concurrent access, only
/// the temporal isolation provided by `I`.
pub struct PulseGenerator<C, O, I>
where
    C: WallClock,
    O: PulseOutput,
    I: Isolation,
{
    clock: C,
    output: O,
    isolation: I,
    /// Assert-to-deassert distance (ns); immutable after start.
    pulse_width_ns: i64,
    /// Calibrated output write latency estimate (ns).
    write_latency_ns: i64,
    /// Worst-case wake jitter filter.
    jitter: WakeJitterFilter,
    /// Instant the next wake-up is requested for.
    next_expiry: Timestamp,
    state: StateMachine,
    metrics: TimingMetrics,
}

impl<C, O, I> PulseGenerator<C, O, I>
where
    C: WallClock,
    O: PulseOutput,
    I: Isolation,
{
    /// Create a generator from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid (pulse width out
    /// of range, see [`GeneratorConfig::validate`]).
    pub fn new(clock: C, output: O, isolation: I, config: &GeneratorConfig) -> PpsResult<Self> {
        config.validate()?;

        Ok(Self {
            clock,
            output,
            isolation,
            pulse_width_ns: config.pulse_width_ns(),
            write_latency_ns: 0,
            jitter: WakeJitterFilter::new(SAFETY_INTERVAL_NS),
            next_expiry: Timestamp::new(0, 0),
            state: StateMachine::new(),
            metrics: TimingMetrics::new(config.metrics.histogram_size),
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> GeneratorState {
        self.state.state()
    }

    /// Current write latency estimate (ns).
    #[must_use]
    pub fn write_latency_ns(&self) -> i64 {
        self.write_latency_ns
    }

    /// Current worst-case wake error estimate (ns).
    #[must_use]
    pub fn wake_error_ns(&self) -> i64 {
        self.jitter.wake_error_ns()
    }

    /// Instant the next cycle expects to be woken at.
    #[must_use]
    pub fn next_expiry(&self) -> Timestamp {
        self.next_expiry
    }

    /// Timing metrics collected so far.
    #[must_use]
    pub fn metrics(&self) -> &TimingMetrics {
        &self.metrics
    }

    /// Measure the output write latency; runs exactly once, before arming.
    ///
    /// # Errors
    ///
    /// Returns an error if calibration is attempted from any state other
    /// than BOOT.
    pub fn calibrate(&mut self) -> PpsResult<i64> {
        self.state.transition(GeneratorState::Calibrate)?;
        self.write_latency_ns =
            calibrate_write_latency(&self.clock, &mut self.output, &self.isolation);
        Ok(self.write_latency_ns)
    }

    /// Compute the first wake instant and arm the generator.
    ///
    /// # Errors
    ///
    /// Returns an error if the generator has not been calibrated.
    pub fn arm(&mut self) -> PpsResult<Timestamp> {
        self.state.transition(GeneratorState::Armed)?;
        self.next_expiry = initial_expiry(self.clock.now(), self.pulse_width_ns, self.write_latency_ns);
        debug!(expiry = %self.next_expiry, "generator armed");
        Ok(self.next_expiry)
    }

    /// Execute one cycle; the caller must already have waited until
    /// [`next_expiry`](Self::next_expiry).
    ///
    /// Places both edges inside a protected section, then updates the
    /// latency and jitter estimates and computes the next wake instant.
    /// A late wake-up skips the edges but still runs the updates, so the
    /// widened margin takes effect on the very next cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the generator is not armed or running.
    pub fn run_cycle(&mut self) -> PpsResult<CycleOutcome> {
        match self.state.state() {
            GeneratorState::Armed => self.state.transition(GeneratorState::Run)?,
            GeneratorState::Run => {}
            other => {
                return Err(PpsError::Fault(format!("cannot run cycle in state {other}")));
            }
        }

        let expire = self.next_expiry;
        let fired = {
            let clock = &self.clock;
            let output = &mut self.output;
            let pulse_width_ns = self.pulse_width_ns;
            let write_latency_ns = self.write_latency_ns;
            self.isolation
                .protect(|| fire(clock, output, expire, pulse_width_ns, write_latency_ns))
        };

        let (t1, emitted) = match fired {
            Fired::Emitted { t1, t2, t3 } => {
                self.write_latency_ns =
                    refine_latency(self.write_latency_ns, t3.elapsed_since(t2));
                self.metrics.record_pulse();
                (t1, true)
            }
            Fired::Late { t1 } => {
                // Deliberate missed-cycle policy: better to skip an edge
                // than emit it at the wrong instant.
                warn!(wake = %t1, "late wakeup, pulse skipped this second");
                self.metrics.record_late();
                (t1, false)
            }
        };

        let wake_delta_ns = t1.elapsed_since(expire).max(0);
        let wake_error_ns = self.jitter.update(wake_delta_ns);
        self.metrics.record_wake_delta(wake_delta_ns);

        self.next_expiry = rearm_expiry(
            expire,
            self.pulse_width_ns,
            self.write_latency_ns,
            wake_error_ns,
        );

        Ok(if emitted {
            CycleOutcome::Emitted {
                wake_delta_ns,
                write_latency_ns: self.write_latency_ns,
                wake_error_ns,
            }
        } else {
            CycleOutcome::Late {
                wake: t1,
                wake_delta_ns,
            }
        })
    }

    /// Stop the generator: no further cycles, line deasserted.
    ///
    /// # Errors
    ///
    /// Returns an error if no stop transition is valid from the current
    /// state (e.g. the generator never left BOOT).
    pub fn stop(&mut self) -> PpsResult<()> {
        self.state.transition(GeneratorState::Stopped)?;
        self.output.set_level(false);
        info!(
            wake_error_ns = self.jitter.wake_error_ns(),
            write_latency_ns = self.write_latency_ns,
            "generator stopped"
        );
        Ok(())
    }
}

/// The protected timing window: lateness check, then both busy-waited
/// edges. No allocation, no logging, no fallible calls.
fn fire<C: WallClock, O: PulseOutput>(
    clock: &C,
    output: &mut O,
    expire: Timestamp,
    pulse_width_ns: i64,
    write_latency_ns: i64,
) -> Fired {
    let t1 = clock.now();
    let lim = NSEC_PER_SEC - pulse_width_ns - write_latency_ns;

    // Too late to place the assert edge where it belongs?
    if t1.sec != expire.sec || t1.nsec > lim {
        return Fired::Late { t1 };
    }

    // Busy-wait until the time is right for the assert edge
    spin_until(clock, expire.sec, lim);
    output.set_level(true);

    // Busy-wait until the time is right for the deassert edge
    let lim = NSEC_PER_SEC - write_latency_ns;
    let t2 = spin_until(clock, expire.sec, lim);
    output.set_level(false);

    let t3 = clock.now();
    Fired::Emitted { t1, t2, t3 }
}

/// Fold one observed write duration into the latency estimate.
///
/// Averaging factor 1/2: output latency is the dominant controllable
/// error source, so the estimate adapts fast.
fn refine_latency(current_ns: i64, observed_ns: i64) -> i64 {
    (current_ns + observed_ns.max(0)) / 2
}

/// Wake instant for the cycle targeting the boundary after `expire`.
fn rearm_expiry(
    expire: Timestamp,
    pulse_width_ns: i64,
    write_latency_ns: i64,
    wake_error_ns: i64,
) -> Timestamp {
    Timestamp::new(
        expire.sec + 1,
        NSEC_PER_SEC
            - (pulse_width_ns + write_latency_ns + SAFETY_INTERVAL_NS + 2 * wake_error_ns),
    )
}

/// First wake instant after calibration.
///
/// Targets the end of the current second, or the next one if fewer than
/// 10ms of it remain; the margin is triple the usual safety interval
/// because no wake-error history exists yet.
fn initial_expiry(now: Timestamp, pulse_width_ns: i64, write_latency_ns: i64) -> Timestamp {
    let sec = if now.nsec > 990_000_000 {
        now.sec + 1
    } else {
        now.sec
    };
    Timestamp::new(
        sec,
        NSEC_PER_SEC - (pulse_width_ns + write_latency_ns + 3 * SAFETY_INTERVAL_NS),
    )
}
