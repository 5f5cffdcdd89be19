//! Scheduling policy and CPU affinity of individual threads.

use virtres_common::error::{Result, VirtResError};

use super::CpuAffinity;

/// Switches `tid` to `SCHED_FIFO` at `priority`.
///
/// # Errors
///
/// Returns [`VirtResError::Syscall`] if `sched_setscheduler(2)` fails.
#[cfg(target_os = "linux")]
pub fn set_fifo_priority(tid: i32, priority: i32) -> Result<()> {
    // SAFETY: sched_param is plain old data; all-zero is a valid value.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = priority;
    // SAFETY: `param` is initialised and outlives the call; the kernel
    // only reads it.
    let rc = unsafe { libc::sched_setscheduler(tid, libc::SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(VirtResError::Syscall {
            op: "sched_setscheduler(SCHED_FIFO)",
            pid: tid,
            value: format!("priority {priority}"),
            source: std::io::Error::last_os_error(),
        });
    }
    tracing::info!(tid, priority, "SCHED_FIFO applied");
    Ok(())
}

/// Reads the CPU affinity of `tid`.
///
/// # Errors
///
/// Returns [`VirtResError::Syscall`] if `sched_getaffinity(2)` fails.
#[cfg(target_os = "linux")]
pub fn get_affinity(tid: i32) -> Result<CpuAffinity> {
    use nix::sched::{CpuSet, sched_getaffinity};
    use nix::unistd::Pid;

    let set = sched_getaffinity(Pid::from_raw(tid)).map_err(|e| VirtResError::Syscall {
        op: "sched_getaffinity",
        pid: tid,
        value: "current mask".into(),
        source: e.into(),
    })?;
    Ok((0..CpuSet::count())
        .filter(|&cpu| set.is_set(cpu).unwrap_or(false))
        .collect())
}

/// Replaces the CPU affinity of `tid`.
///
/// # Errors
///
/// Returns [`VirtResError::Syscall`] if a CPU id does not fit the kernel
/// mask or `sched_setaffinity(2)` fails.
#[cfg(target_os = "linux")]
pub fn set_affinity(tid: i32, affinity: &CpuAffinity) -> Result<()> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let syscall_err = |source: nix::errno::Errno| VirtResError::Syscall {
        op: "sched_setaffinity",
        pid: tid,
        value: affinity.to_string(),
        source: source.into(),
    };

    let mut set = CpuSet::new();
    for cpu in affinity.cpus() {
        set.set(cpu).map_err(syscall_err)?;
    }
    sched_setaffinity(Pid::from_raw(tid), &set).map_err(syscall_err)?;
    tracing::info!(tid, cpus = %affinity, "CPU affinity applied");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: scheduling policies require Linux.
#[cfg(not(target_os = "linux"))]
pub fn set_fifo_priority(_tid: i32, _priority: i32) -> Result<()> {
    Err(VirtResError::Config {
        message: "Linux required for realtime scheduling".into(),
    })
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: thread affinity requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn get_affinity(_tid: i32) -> Result<CpuAffinity> {
    Err(VirtResError::Config {
        message: "Linux required for CPU affinity".into(),
    })
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: thread affinity requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn set_affinity(_tid: i32, _affinity: &CpuAffinity) -> Result<()> {
    Err(VirtResError::Config {
        message: "Linux required for CPU affinity".into(),
    })
}
