//! Configuration structures for the PPS generator.
//!
//! Supports TOML deserialization with sensible defaults for
//! development and explicit values for production deployment.

use crate::error::{PpsError, PpsResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on the configurable pulse width (ns).
pub const PULSE_WIDTH_MAX_NS: u64 = 100_000;

/// Top-level generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Distance between the assert edge and the deassert edge.
    /// Must not exceed 100µs; the deassert edge lands on the second boundary.
    #[serde(with = "humantime_serde")]
    pub pulse_width: Duration,

    /// Output line configuration.
    pub output: OutputConfig,

    /// Real-time configuration.
    pub realtime: RealtimeConfig,

    /// Metrics and diagnostics configuration.
    pub metrics: MetricsConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            pulse_width: Duration::from_micros(30),
            output: OutputConfig::default(),
            realtime: RealtimeConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Output line configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output driver type.
    pub driver: OutputDriver,

    /// GPIO line number for the sysfs driver.
    /// Must be explicitly configured - no default to avoid toggling the wrong pin.
    pub gpio_line: Option<u32>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            driver: OutputDriver::Simulated,
            gpio_line: None,
        }
    }
}

/// Supported output drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputDriver {
    /// In-memory output for testing.
    #[default]
    Simulated,
    /// Linux sysfs GPIO attribute.
    Sysfs,
}

/// Real-time scheduling configuration.
///
/// The busy-wait windows assume the thread is not preempted while they run;
/// these settings are how that assumption is made to hold on a real host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Enable real-time scheduling (requires privileges).
    pub enabled: bool,

    /// Scheduler policy: "fifo" or "rr" (round-robin).
    pub policy: SchedPolicy,

    /// Scheduler priority (1-99 for RT policies).
    pub priority: u8,

    /// Pin the generator thread to a single CPU core.
    pub cpu_pin: Option<usize>,

    /// Lock all memory pages (mlockall).
    pub lock_memory: bool,

    /// Fail immediately at startup if RT requirements cannot be met.
    /// When true, startup returns an error if CAP_SYS_NICE or
    /// CAP_IPC_LOCK are not available.
    pub fail_fast: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            policy: SchedPolicy::Fifo,
            priority: 90,
            cpu_pin: None,
            lock_memory: true,
            fail_fast: false,
        }
    }
}

/// Scheduler policy for the generator thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedPolicy {
    /// SCHED_FIFO: First-in-first-out real-time.
    #[default]
    Fifo,
    /// SCHED_RR: Round-robin real-time.
    Rr,
    /// SCHED_OTHER: Normal time-sharing (non-RT).
    Other,
}

/// Metrics and diagnostics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics collection.
    pub enabled: bool,

    /// Size of the wake-delta histogram ring buffer.
    /// One sample per second; 3600 covers an hour.
    pub histogram_size: usize,

    /// Percentiles to compute for status reports.
    pub percentiles: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            histogram_size: 3_600,
            percentiles: vec![50.0, 90.0, 99.0],
        }
    }
}

impl GeneratorConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate the configuration before the generator starts.
    ///
    /// # Errors
    ///
    /// Returns [`PpsError::InvalidPulseWidth`] if the pulse width exceeds
    /// 100µs, and [`PpsError::Config`] if the sysfs driver is selected
    /// without a GPIO line.
    pub fn validate(&self) -> PpsResult<()> {
        let requested_ns = u64::try_from(self.pulse_width.as_nanos()).unwrap_or(u64::MAX);
        if requested_ns > PULSE_WIDTH_MAX_NS {
            return Err(PpsError::InvalidPulseWidth {
                requested_ns,
                max_ns: PULSE_WIDTH_MAX_NS,
            });
        }

        if self.output.driver == OutputDriver::Sysfs && self.output.gpio_line.is_none() {
            return Err(PpsError::Config(
                "sysfs output driver requires output.gpio_line".into(),
            ));
        }

        Ok(())
    }

    /// Pulse width in nanoseconds, as used by the cycle controller.
    #[must_use]
    pub fn pulse_width_ns(&self) -> i64 {
        i64::try_from(self.pulse_width.as_nanos()).unwrap_or(i64::MAX)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
