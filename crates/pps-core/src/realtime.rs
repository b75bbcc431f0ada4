//! Real-time scheduling and memory locking for the busy-wait engine.
//!
//! The edge-placement loops spin on the wall clock for up to a few tens of
//! microseconds per second; a preemption inside that window shows up
//! directly as edge jitter. This module sets up the environment that keeps
//! preemptions out:
//! - Memory locking (mlockall) so no page fault lands mid-spin
//! - SCHED_FIFO/SCHED_RR priority so housekeeping cannot preempt the loop
//! - Pinning to a single CPU so the spin never migrates cores

#![allow(unused_imports)] // Platform-specific code may not use all imports

use pps_common::config::{RealtimeConfig, SchedPolicy};
use pps_common::error::{PpsError, PpsResult};
use tracing::{debug, error, info, warn};

/// Result of real-time initialization.
#[derive(Debug, Clone)]
pub struct RealtimeStatus {
    /// Whether memory was locked successfully.
    pub memory_locked: bool,
    /// Applied scheduler policy.
    pub scheduler_policy: Option<SchedPolicy>,
    /// Applied scheduler priority.
    pub scheduler_priority: Option<u8>,
    /// CPU the generator thread is pinned to.
    pub cpu_pin: Option<usize>,
}

/// Initialize the real-time environment based on configuration.
///
/// # Errors
///
/// Returns an error if a required RT feature fails to initialize.
/// Missing privileges (EPERM) are downgraded to warnings unless
/// `fail_fast` is set.
///
/// # Platform Support
///
/// Full support on Linux, ideally with a PREEMPT_RT kernel.
/// No-op on other platforms.
pub fn init_realtime(config: &RealtimeConfig) -> PpsResult<RealtimeStatus> {
    if !config.enabled {
        info!("Real-time scheduling disabled in configuration");
        return Ok(RealtimeStatus {
            memory_locked: false,
            scheduler_policy: None,
            scheduler_priority: None,
            cpu_pin: None,
        });
    }

    // If fail_fast is enabled, validate RT capabilities before proceeding
    if config.fail_fast {
        info!("Validating real-time capabilities (fail_fast=true)");
        validate_rt_capabilities(config)?;
    }

    info!("Initializing real-time environment");

    let memory_locked = if config.lock_memory {
        lock_memory()?
    } else {
        false
    };

    let (scheduler_policy, scheduler_priority) = set_scheduler(config.policy, config.priority)?;

    let cpu_pin = pin_cpu(config.cpu_pin)?;

    let status = RealtimeStatus {
        memory_locked,
        scheduler_policy,
        scheduler_priority,
        cpu_pin,
    };

    info!(?status, "Real-time initialization complete");
    Ok(status)
}

/// Lock all current and future memory pages.
#[cfg(target_os = "linux")]
fn lock_memory() -> PpsResult<bool> {
    use nix::sys::mman::{mlockall, MlockAllFlags};

    debug!("Locking memory pages with mlockall");

    match mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
        Ok(()) => {
            info!("Memory locked successfully");
            Ok(true)
        }
        Err(e) => {
            // EPERM is common when not running as root or without CAP_IPC_LOCK
            if e == nix::errno::Errno::EPERM {
                warn!(
                    "mlockall failed with EPERM - running without CAP_IPC_LOCK capability. \
                     Page faults may perturb edge timing."
                );
                Ok(false)
            } else {
                Err(PpsError::Config(format!("mlockall failed: {e}")))
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn lock_memory() -> PpsResult<bool> {
    warn!("mlockall not available on this platform");
    Ok(false)
}

/// Set real-time scheduler policy and priority for the current thread.
#[cfg(target_os = "linux")]
fn set_scheduler(
    policy: SchedPolicy,
    priority: u8,
) -> PpsResult<(Option<SchedPolicy>, Option<u8>)> {
    let linux_policy = match policy {
        SchedPolicy::Fifo => libc::SCHED_FIFO,
        SchedPolicy::Rr => libc::SCHED_RR,
        SchedPolicy::Other => {
            debug!("Using SCHED_OTHER (non-RT) scheduling");
            return Ok((Some(SchedPolicy::Other), None));
        }
    };

    // Clamp priority to valid range (1-99 for RT policies)
    let clamped_priority = priority.clamp(1, 99);
    if clamped_priority != priority {
        warn!(
            original = priority,
            clamped = clamped_priority,
            "Scheduler priority clamped to valid range"
        );
    }

    debug!(
        ?policy,
        priority = clamped_priority,
        "Setting real-time scheduler"
    );

    let param = libc::sched_param {
        sched_priority: i32::from(clamped_priority),
    };

    // SAFETY: sched_setscheduler is safe when called with a valid
    // sched_param; pid 0 targets the calling thread group.
    let result = unsafe { libc::sched_setscheduler(0, linux_policy, &param) };

    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            warn!(
                "sched_setscheduler failed with EPERM - running without RT privileges. \
                 Consider running with CAP_SYS_NICE capability or as root."
            );
            return Ok((None, None));
        }
        return Err(PpsError::Config(format!(
            "sched_setscheduler failed: {err}"
        )));
    }

    info!(
        ?policy,
        priority = clamped_priority,
        "Real-time scheduler configured"
    );
    Ok((Some(policy), Some(clamped_priority)))
}

#[cfg(not(target_os = "linux"))]
fn set_scheduler(
    policy: SchedPolicy,
    priority: u8,
) -> PpsResult<(Option<SchedPolicy>, Option<u8>)> {
    warn!(
        ?policy,
        priority, "Real-time scheduling not available on this platform"
    );
    Ok((None, None))
}

/// Pin the current thread to a single CPU.
#[cfg(target_os = "linux")]
fn pin_cpu(cpu: Option<usize>) -> PpsResult<Option<usize>> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let Some(cpu) = cpu else {
        debug!("No CPU pin configured");
        return Ok(None);
    };

    debug!(cpu, "Pinning generator thread");

    let mut cpu_set = CpuSet::new();
    cpu_set
        .set(cpu)
        .map_err(|e| PpsError::Config(format!("Invalid CPU index {cpu}: {e}")))?;

    match sched_setaffinity(Pid::from_raw(0), &cpu_set) {
        Ok(()) => {
            info!(cpu, "CPU pin set");
            Ok(Some(cpu))
        }
        Err(e) => {
            if e == nix::errno::Errno::EINVAL {
                warn!(cpu, "Invalid CPU - it may not exist on this system");
                Ok(None)
            } else {
                Err(PpsError::Config(format!("sched_setaffinity failed: {e}")))
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_cpu(cpu: Option<usize>) -> PpsResult<Option<usize>> {
    if cpu.is_some() {
        warn!("CPU pinning not available on this platform");
    }
    Ok(None)
}

/// Check if the current process has real-time capabilities.
#[cfg(target_os = "linux")]
pub fn check_rt_capabilities() -> RtCapabilities {
    use std::fs;

    let mut caps = RtCapabilities {
        // SAFETY: geteuid is always safe to call
        is_root: unsafe { libc::geteuid() } == 0,
        ..Default::default()
    };

    // Check RLIMIT_RTPRIO
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit writes into the rlimit struct we provide
    if unsafe { libc::getrlimit(libc::RLIMIT_RTPRIO, &mut rlim) } == 0 {
        caps.rtprio_limit = Some(rlim.rlim_cur);
    }

    // Check RLIMIT_MEMLOCK
    // SAFETY: as above
    if unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut rlim) } == 0 {
        caps.memlock_limit = Some(rlim.rlim_cur);
    }

    // Check for PREEMPT_RT kernel
    if let Ok(version) = fs::read_to_string("/proc/version") {
        caps.preempt_rt = version.contains("PREEMPT_RT") || version.contains("PREEMPT RT");
    }

    caps
}

#[cfg(not(target_os = "linux"))]
pub fn check_rt_capabilities() -> RtCapabilities {
    RtCapabilities::default()
}

/// Information about real-time capabilities of the system.
#[derive(Debug, Clone, Default)]
pub struct RtCapabilities {
    /// Whether running as root.
    pub is_root: bool,
    /// RLIMIT_RTPRIO value (max RT priority allowed).
    pub rtprio_limit: Option<u64>,
    /// RLIMIT_MEMLOCK value (max lockable memory).
    pub memlock_limit: Option<u64>,
    /// Whether running on a PREEMPT_RT kernel.
    pub preempt_rt: bool,
}

impl RtCapabilities {
    /// Check if RT scheduling is likely to succeed.
    #[must_use]
    pub fn can_use_rt_scheduling(&self) -> bool {
        self.is_root || self.rtprio_limit.is_some_and(|l| l > 0)
    }

    /// Check if memory locking is likely to succeed.
    #[must_use]
    pub fn can_lock_memory(&self) -> bool {
        if self.is_root {
            return true;
        }

        #[cfg(target_family = "unix")]
        {
            self.memlock_limit.is_some_and(|l| l == libc::RLIM_INFINITY)
        }

        #[cfg(not(target_family = "unix"))]
        {
            false
        }
    }
}

/// Validate that real-time capabilities are available.
///
/// Called when `fail_fast` is enabled in the realtime config.
///
/// # Errors
///
/// Returns an error describing which RT requirements are not met:
/// - CAP_SYS_NICE / RLIMIT_RTPRIO not available
/// - CAP_IPC_LOCK / RLIMIT_MEMLOCK not available
pub fn validate_rt_capabilities(config: &RealtimeConfig) -> PpsResult<()> {
    if !config.enabled {
        // RT not enabled, nothing to validate
        return Ok(());
    }

    let caps = check_rt_capabilities();
    let mut issues = Vec::new();

    // PREEMPT_RT is strongly recommended for sub-10µs jitter, but a
    // vanilla kernel still works for soft targets; warn, don't fail.
    if !caps.preempt_rt {
        warn!(
            "PREEMPT_RT kernel not detected. Edge jitter may be degraded. \
             For production deployments, use a kernel with PREEMPT_RT patches."
        );
    }

    if config.policy != SchedPolicy::Other && !caps.can_use_rt_scheduling() {
        issues.push(format!(
            "Cannot use RT scheduling (SCHED_{:?}): RLIMIT_RTPRIO={:?}, is_root={}. \
             Grant CAP_SYS_NICE capability or set RLIMIT_RTPRIO > 0.",
            config.policy, caps.rtprio_limit, caps.is_root
        ));
    }

    if config.lock_memory && !caps.can_lock_memory() {
        issues.push(format!(
            "Cannot lock memory: RLIMIT_MEMLOCK={:?}, is_root={}. \
             Grant CAP_IPC_LOCK capability or set RLIMIT_MEMLOCK to unlimited.",
            caps.memlock_limit, caps.is_root
        ));
    }

    if issues.is_empty() {
        info!("Real-time capabilities validated successfully");
        Ok(())
    } else {
        let message = format!(
            "Real-time requirements not met (fail_fast=true):\n  - {}",
            issues.join("\n  - ")
        );
        error!("{}", message);
        Err(PpsError::Config(message))
    }
}
