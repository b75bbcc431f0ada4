//! Output line abstraction and drivers.
//!
//! The latency between requesting a level change and the change taking
//! physical effect is unknown and device-dependent; the cycle controller
//! calibrates it empirically and keeps refining the estimate. Drivers must
//! therefore keep `set_level` as close to a bare register/attribute write
//! as possible - no logging, no allocation.

use pps_common::error::{PpsError, PpsResult};

/// A boolean output line with non-deterministic write latency.
pub trait PulseOutput {
    /// Drive the line to the given level.
    ///
    /// Called from inside the protected timing window; implementations must
    /// not block, log, or allocate. Failures are counted by the driver and
    /// surfaced out-of-band.
    fn set_level(&mut self, level: bool);
}

/// In-memory output for tests and dry runs.
#[derive(Debug, Default)]
pub struct SimulatedOutput {
    level: bool,
    writes: u64,
}

impl SimulatedOutput {
    /// Create a new simulated output, initially deasserted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current line level.
    #[must_use]
    pub fn level(&self) -> bool {
        self.level
    }

    /// Total writes performed.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl PulseOutput for SimulatedOutput {
    fn set_level(&mut self, level: bool) {
        self.level = level;
        self.writes += 1;
    }
}

/// Linux sysfs GPIO output driver.
///
/// Exports the line if needed, forces it to output-low, and keeps the
/// `value` attribute open for the lifetime of the generator so the hot
/// path is a seek plus a one-byte write.
#[cfg(target_os = "linux")]
pub mod sysfs {
    use super::{PpsError, PpsResult, PulseOutput};
    use std::fs::{self, File, OpenOptions};
    use std::io::{Seek, SeekFrom, Write};
    use std::path::PathBuf;

    /// GPIO line driven through `/sys/class/gpio`.
    #[derive(Debug)]
    pub struct SysfsOutput {
        value: File,
        line: u32,
        write_failures: u64,
    }

    impl SysfsOutput {
        /// Acquire the GPIO line and configure it as an output, driven low.
        ///
        /// # Errors
        ///
        /// Returns [`PpsError::Output`] if the line cannot be exported,
        /// configured, or opened - the generator must not start without a
        /// working output.
        pub fn open(line: u32) -> PpsResult<Self> {
            let base = PathBuf::from(format!("/sys/class/gpio/gpio{line}"));

            if !base.exists() {
                fs::write("/sys/class/gpio/export", line.to_string()).map_err(|e| {
                    PpsError::Output(format!("cannot export GPIO line {line}: {e}"))
                })?;
            }

            // "low" sets direction to output with the line deasserted
            fs::write(base.join("direction"), "low").map_err(|e| {
                PpsError::Output(format!("cannot configure GPIO line {line}: {e}"))
            })?;

            let value = OpenOptions::new()
                .write(true)
                .open(base.join("value"))
                .map_err(|e| {
                    PpsError::Output(format!("cannot open value attribute for line {line}: {e}"))
                })?;

            Ok(Self {
                value,
                line,
                write_failures: 0,
            })
        }

        /// The sysfs line number this driver was opened on.
        #[must_use]
        pub fn line(&self) -> u32 {
            self.line
        }

        /// Writes that failed at the sysfs layer since open.
        #[must_use]
        pub fn write_failures(&self) -> u64 {
            self.write_failures
        }
    }

    impl PulseOutput for SysfsOutput {
        fn set_level(&mut self, level: bool) {
            let byte: &[u8] = if level { b"1" } else { b"0" };
            // Counted, not logged: this runs inside the protected window
            let result = self
                .value
                .seek(SeekFrom::Start(0))
                .and_then(|_| self.value.write_all(byte));
            if result.is_err() {
                self.write_failures += 1;
            }
        }
    }
}

#[cfg(target_os = "linux")]
pub use sysfs::SysfsOutput;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_output_levels() {
        let mut out = SimulatedOutput::new();
        assert!(!out.level());

        out.set_level(true);
        assert!(out.level());
        out.set_level(false);
        assert!(!out.level());
        assert_eq!(out.writes(), 2);
    }

    #[test]
    fn test_idempotent_deassert() {
        // Calibration hammers the deassert write; the level must stay low.
        let mut out = SimulatedOutput::new();
        for _ in 0..32 {
            out.set_level(false);
        }
        assert!(!out.level());
        assert_eq!(out.writes(), 32);
    }
}
