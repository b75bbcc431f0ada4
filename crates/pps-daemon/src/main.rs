//! PPS generator daemon entry point.
//!
//! Wires the timing engine to a real clock, timer, and output driver,
//! sets up the real-time environment and signal handling, and drives the
//! calibrate / arm / cycle / rearm loop until shutdown.

mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use pps_common::config::{GeneratorConfig, OutputDriver};
use pps_core::clock::RealtimeClock;
use pps_core::critical::DefaultIsolation;
use pps_core::cycle::{CycleOutcome, PulseGenerator};
use pps_core::output::{PulseOutput, SimulatedOutput};
use pps_core::realtime::init_realtime;
use pps_core::timer::{AbsoluteSleepTimer, WakeupTimer};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::signals::SignalHandler;

/// Cycles between periodic status log lines (one cycle per second).
const STATUS_INTERVAL_CYCLES: u64 = 60;

/// PPS daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "pps-daemon",
    about = "Pulse-per-second generator - phase-locked edges on an output line",
    version,
    long_about = None
)]
struct Args {
    /// Path to a generator configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pulse width, e.g. "30us" (overrides config file).
    #[arg(long, short = 'p', value_parser = humantime::parse_duration)]
    pulse_width: Option<Duration>,

    /// GPIO line for the sysfs driver (overrides config file).
    #[arg(long, short = 'g', value_name = "LINE")]
    gpio_line: Option<u32>,

    /// Run with the simulated output driver (no hardware).
    #[arg(long, short = 's')]
    simulated: bool,

    /// Maximum pulses to emit (0 = infinite).
    #[arg(long, default_value = "0")]
    max_pulses: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting PPS daemon");

    let mut config = load_config(&args)?;

    // Command-line overrides
    if let Some(width) = args.pulse_width {
        config.pulse_width = width;
    }
    if let Some(line) = args.gpio_line {
        config.output.driver = OutputDriver::Sysfs;
        config.output.gpio_line = Some(line);
    }
    if args.simulated {
        config.output.driver = OutputDriver::Simulated;
    }

    config
        .validate()
        .context("Invalid generator configuration")?;

    info!(
        pulse_width = %humantime::format_duration(config.pulse_width),
        driver = ?config.output.driver,
        "Configuration loaded"
    );

    let signal_handler = SignalHandler::new().context("Failed to set up signal handlers")?;

    let rt_status = init_realtime(&config.realtime)
        .context("Failed to initialize real-time environment")?;
    if config.realtime.enabled && !rt_status.memory_locked {
        warn!("Running without locked memory; expect occasional jitter spikes");
    }

    run_daemon(&config, &signal_handler, args.max_pulses)
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "pps_daemon={},pps_core={},pps_common={}",
        level, level, level
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `PPS_CONFIG_PATH` environment variable
/// 3. `/etc/pps-gen/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<GeneratorConfig> {
    // 1. Command-line argument (highest priority)
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return GeneratorConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    // 2. Environment variable
    if let Ok(env_path) = std::env::var("PPS_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from PPS_CONFIG_PATH");
            return GeneratorConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from PPS_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "PPS_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    // 3. System path
    let system_path = PathBuf::from("/etc/pps-gen/config.toml");
    if system_path.exists() {
        info!(?system_path, "Loading config from system path");
        return GeneratorConfig::from_file(&system_path)
            .with_context(|| format!("Failed to load config from {system_path:?}"));
    }

    // 4. Local development path
    let local_path = PathBuf::from("config/default.toml");
    if local_path.exists() {
        info!(?local_path, "Loading config from local path");
        return GeneratorConfig::from_file(&local_path)
            .with_context(|| format!("Failed to load config from {local_path:?}"));
    }

    // 5. Built-in defaults
    info!("No config file found, using built-in defaults");
    Ok(GeneratorConfig::default())
}

/// Instantiate the configured output driver and run the generator on it.
fn run_daemon(
    config: &GeneratorConfig,
    signal_handler: &SignalHandler,
    max_pulses: u64,
) -> Result<()> {
    match config.output.driver {
        OutputDriver::Simulated => {
            info!("Using simulated output driver");
            run_generator(SimulatedOutput::new(), config, signal_handler, max_pulses)
        }
        OutputDriver::Sysfs => {
            #[cfg(target_os = "linux")]
            {
                let line = config
                    .output
                    .gpio_line
                    .context("sysfs driver requires output.gpio_line")?;
                info!(line, "Using sysfs GPIO output driver");
                let output = pps_core::output::SysfsOutput::open(line)
                    .context("Failed to open GPIO line")?;
                run_generator(output, config, signal_handler, max_pulses)
            }
            #[cfg(not(target_os = "linux"))]
            {
                anyhow::bail!("sysfs output driver is only available on Linux")
            }
        }
    }
}

/// The main generator loop: calibrate, arm, then cycle once per second
/// until shutdown or the pulse limit.
fn run_generator<O: PulseOutput>(
    output: O,
    config: &GeneratorConfig,
    signal_handler: &SignalHandler,
    max_pulses: u64,
) -> Result<()> {
    let timer = AbsoluteSleepTimer;
    let mut generator =
        PulseGenerator::new(RealtimeClock, output, DefaultIsolation::default(), config)
            .context("Failed to create generator")?;

    let write_latency_ns = generator
        .calibrate()
        .context("Output write calibration failed")?;
    info!(write_latency_ns, "Calibration complete");

    let first_expiry = generator.arm().context("Failed to arm generator")?;
    info!(expiry = %first_expiry, "Generator armed, entering main loop");

    let mut cycles_run = 0u64;

    loop {
        if signal_handler.shutdown_requested() {
            info!("Shutdown signal received, stopping generator");
            break;
        }

        if signal_handler.take_status_request() {
            log_status(&generator, config, cycles_run);
        }

        timer.wait_until(generator.next_expiry());

        match generator.run_cycle() {
            Ok(CycleOutcome::Emitted { .. }) => {}
            Ok(CycleOutcome::Late { wake, wake_delta_ns }) => {
                warn!(%wake, wake_delta_ns, "Cycle was late, pulse skipped");
            }
            Err(e) => {
                error!("Cycle execution failed: {e}");
                signal_handler.request_shutdown();
                break;
            }
        }

        cycles_run += 1;

        if max_pulses > 0 && generator.metrics().pulses_emitted() >= max_pulses {
            info!(
                pulses = generator.metrics().pulses_emitted(),
                "Maximum pulse count reached"
            );
            break;
        }

        if cycles_run % STATUS_INTERVAL_CYCLES == 0 {
            log_status(&generator, config, cycles_run);
        }
    }

    // Graceful shutdown
    info!("Shutting down...");

    if let Err(e) = generator.stop() {
        warn!("Generator stop failed: {e}");
    }

    let snapshot = generator.metrics().snapshot();
    let metrics_json = serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".into());
    info!(
        total_cycles = snapshot.total_cycles,
        pulses_emitted = snapshot.pulses_emitted,
        late_cycles = snapshot.late_cycles,
        wake_error_ns = generator.wake_error_ns(),
        signals = signal_handler.state().signal_count(),
        last_signal = ?signal_handler.state().last_signal(),
        metrics = %metrics_json,
        "Daemon shutdown complete"
    );

    Ok(())
}

/// Emit a periodic or on-demand status line.
fn log_status<O: PulseOutput>(
    generator: &PulseGenerator<RealtimeClock, O, DefaultIsolation>,
    config: &GeneratorConfig,
    cycles_run: u64,
) {
    let metrics = generator.metrics();
    let percentiles: Vec<(f64, Option<i64>)> = config
        .metrics
        .percentiles
        .iter()
        .map(|&p| (p, metrics.percentile(p)))
        .collect();

    info!(
        cycles = cycles_run,
        pulses = metrics.pulses_emitted(),
        late = metrics.late_cycles(),
        write_latency_ns = generator.write_latency_ns(),
        wake_error_ns = generator.wake_error_ns(),
        mean_wake_delta_ns = metrics.mean_ns().unwrap_or(0),
        max_wake_delta_ns = metrics.max_ns().unwrap_or(0),
        wake_delta_percentiles = ?percentiles,
        "Periodic status"
    );
}
