//! Adaptive pulse-per-second timing engine.
//!
//! Emits a rising edge phase-locked to wall-clock second boundaries and a
//! falling edge a configured pulse width later, compensating for output
//! write latency and scheduler wake-up jitter with continuously refined
//! estimates. The hardware-facing seams (clock, output, timer, isolation)
//! are traits, so the full algorithm also runs against the deterministic
//! simulation in [`sim`].

pub mod calibrate;
pub mod clock;
pub mod critical;
pub mod cycle;
pub mod jitter;
pub mod output;
pub mod realtime;
pub mod sim;
pub mod timer;

pub use calibrate::{calibrate_write_latency, CALIBRATION_SHIFT, CALIBRATION_TRIALS};
pub use clock::{spin_until, RealtimeClock, WallClock};
pub use critical::{DefaultIsolation, Isolation, NoIsolation};
pub use cycle::{CycleOutcome, PulseGenerator};
pub use jitter::WakeJitterFilter;
pub use output::{PulseOutput, SimulatedOutput};
#[cfg(target_os = "linux")]
pub use output::SysfsOutput;
pub use realtime::{check_rt_capabilities, init_realtime, RealtimeStatus, RtCapabilities};
pub use timer::{AbsoluteSleepTimer, WakeupTimer};
