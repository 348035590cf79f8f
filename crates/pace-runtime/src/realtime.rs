//! Real-time setup for pacing threads.
//!
//! Paced loops hold sub-millisecond jitter only when the thread is not
//! preempted or stalled on page faults. This module applies the usual
//! countermeasures from configuration:
//! - mlockall to keep pages resident
//! - stack pre-faulting ahead of the first tick
//! - SCHED_FIFO/SCHED_RR priority
//! - CPU affinity
//!
//! Missing privileges degrade gracefully: the affected step is skipped with
//! a warning and pacing continues under normal scheduling.

use tracing::{debug, info, warn};

use pace_common::{CpuAffinity, PaceError, PaceResult, RealtimeConfig, SchedPolicy};

/// What real-time setup actually took effect.
#[derive(Debug, Clone)]
pub struct RealtimeStatus {
    /// Whether memory was locked successfully.
    pub memory_locked: bool,
    /// Stack bytes pre-faulted.
    pub stack_prefaulted: usize,
    /// Applied scheduler policy.
    pub scheduler_policy: Option<SchedPolicy>,
    /// Applied scheduler priority.
    pub scheduler_priority: Option<u8>,
    /// CPUs the thread is pinned to.
    pub cpu_affinity: Option<Vec<usize>>,
}

impl RealtimeStatus {
    fn disabled() -> Self {
        Self {
            memory_locked: false,
            stack_prefaulted: 0,
            scheduler_policy: None,
            scheduler_priority: None,
            cpu_affinity: None,
        }
    }
}

/// Applies the configured real-time setup to the calling thread.
///
/// # Errors
///
/// Returns [`PaceError::Config`] only for failures that are not a plain
/// privilege problem; EPERM from the kernel downgrades to a warning.
pub fn init_realtime(config: &RealtimeConfig) -> PaceResult<RealtimeStatus> {
    if !config.enabled {
        info!("Real-time setup disabled in configuration");
        return Ok(RealtimeStatus::disabled());
    }

    info!("Applying real-time setup to the pacing thread");

    let memory_locked = if config.lock_memory {
        lock_memory()?
    } else {
        false
    };

    let stack_prefaulted = prefault_stack(config.prefault_stack_size);
    let (scheduler_policy, scheduler_priority) = set_scheduler(config.policy, config.priority)?;
    let cpu_affinity = set_cpu_affinity(&config.cpu_affinity)?;

    let status = RealtimeStatus {
        memory_locked,
        stack_prefaulted,
        scheduler_policy,
        scheduler_priority,
        cpu_affinity,
    };
    info!(?status, "Real-time setup complete");
    Ok(status)
}

/// Locks current and future pages into RAM.
#[cfg(target_os = "linux")]
fn lock_memory() -> PaceResult<bool> {
    use nix::sys::mman::{mlockall, MlockAllFlags};

    match mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
        Ok(()) => {
            info!("Memory locked");
            Ok(true)
        }
        Err(e) if e == nix::errno::Errno::EPERM => {
            // Common without CAP_IPC_LOCK; pacing still works, page faults
            // may add jitter.
            warn!("mlockall denied (EPERM), continuing without locked memory");
            Ok(false)
        }
        Err(e) => Err(PaceError::Config(format!("mlockall failed: {e}"))),
    }
}

#[cfg(not(target_os = "linux"))]
fn lock_memory() -> PaceResult<bool> {
    warn!("mlockall not available on this platform");
    Ok(false)
}

/// Touches up to `size` bytes of stack so the pacing loop does not fault
/// them in later. Returns the bytes actually touched.
fn prefault_stack(size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    let touched = touch_stack(size, page_size(), 0);
    debug!(requested = size, touched, "Stack pre-fault done");
    touched
}

/// Burns one stack frame per call, writing one byte per page.
#[inline(never)]
fn touch_stack(remaining: usize, page: usize, depth: usize) -> usize {
    const FRAME: usize = 16 * 1024;
    // Depth cap keeps the pre-fault itself from overflowing small stacks.
    const MAX_DEPTH: usize = 256;

    if remaining == 0 || depth >= MAX_DEPTH {
        return 0;
    }

    let mut buffer = [0u8; FRAME];
    let stride = page.clamp(1, FRAME);
    let mut offset = 0;
    while offset < FRAME {
        // SAFETY: in-bounds write into our own stack buffer
        unsafe { std::ptr::write_volatile(buffer.as_mut_ptr().add(offset), 0xA5) };
        offset += stride;
    }
    std::hint::black_box(&buffer);

    let covered = FRAME.min(remaining);
    covered + touch_stack(remaining - covered, page, depth + 1)
}

/// System page size in bytes.
fn page_size() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    }
    #[cfg(not(unix))]
    {
        4096
    }
}

/// Requests a real-time scheduler class for the calling thread.
#[cfg(target_os = "linux")]
fn set_scheduler(
    policy: SchedPolicy,
    priority: u8,
) -> PaceResult<(Option<SchedPolicy>, Option<u8>)> {
    let linux_policy = match policy {
        SchedPolicy::Fifo => libc::SCHED_FIFO,
        SchedPolicy::Rr => libc::SCHED_RR,
        SchedPolicy::Other => {
            debug!("Keeping SCHED_OTHER (non-RT) scheduling");
            return Ok((Some(SchedPolicy::Other), None));
        }
    };

    let clamped = priority.clamp(1, 99);
    if clamped != priority {
        warn!(
            requested = priority,
            applied = clamped,
            "Scheduler priority clamped to the RT range"
        );
    }

    let param = libc::sched_param {
        sched_priority: i32::from(clamped),
    };
    // SAFETY: sched_setscheduler with a valid sched_param is safe
    let rc = unsafe { libc::sched_setscheduler(0, linux_policy, &param) };

    if rc == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            warn!("sched_setscheduler denied (EPERM), continuing without RT priority");
            return Ok((None, None));
        }
        return Err(PaceError::Config(format!("sched_setscheduler failed: {err}")));
    }

    info!(?policy, priority = clamped, "Real-time scheduler set");
    Ok((Some(policy), Some(clamped)))
}

#[cfg(not(target_os = "linux"))]
fn set_scheduler(
    policy: SchedPolicy,
    priority: u8,
) -> PaceResult<(Option<SchedPolicy>, Option<u8>)> {
    warn!(?policy, priority, "Real-time scheduling not available on this platform");
    Ok((None, None))
}

/// Pins the calling thread to the configured CPUs.
#[cfg(target_os = "linux")]
fn set_cpu_affinity(affinity: &CpuAffinity) -> PaceResult<Option<Vec<usize>>> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let cpus = match affinity {
        CpuAffinity::None => return Ok(None),
        CpuAffinity::Single(cpu) => vec![*cpu],
        CpuAffinity::Set(cpus) => cpus.clone(),
    };
    if cpus.is_empty() {
        return Ok(None);
    }

    let mut cpu_set = CpuSet::new();
    for &cpu in &cpus {
        cpu_set
            .set(cpu)
            .map_err(|e| PaceError::Config(format!("Invalid CPU index {cpu}: {e}")))?;
    }

    match sched_setaffinity(Pid::from_raw(0), &cpu_set) {
        Ok(()) => {
            info!(?cpus, "CPU affinity set");
            Ok(Some(cpus))
        }
        Err(e) if e == nix::errno::Errno::EINVAL => {
            warn!(?cpus, "CPU set rejected, some CPUs may not exist");
            Ok(None)
        }
        Err(e) => Err(PaceError::Config(format!("sched_setaffinity failed: {e}"))),
    }
}

#[cfg(not(target_os = "linux"))]
fn set_cpu_affinity(affinity: &CpuAffinity) -> PaceResult<Option<Vec<usize>>> {
    if !matches!(affinity, CpuAffinity::None) {
        warn!("CPU affinity not available on this platform");
    }
    Ok(None)
}
