//! Locked-memory limits of foreign processes via `prlimit(2)`.
//!
//! `setrlimit(2)` only reaches the calling process, so raising the limit
//! of a hypervisor worker goes through `prlimit(2)` with an explicit pid.

use virtres_common::error::{Result, VirtResError};

/// Sets both the soft and hard `RLIMIT_MEMLOCK` of `pid` to `bytes`.
///
/// # Errors
///
/// Returns [`VirtResError::Syscall`] carrying `pid` and `bytes` if the
/// kernel rejects the call (`ESRCH`, `EPERM`, ...).
#[cfg(target_os = "linux")]
pub fn set_memlock_limit(pid: i32, bytes: u64) -> Result<()> {
    let limit = libc::rlimit {
        rlim_cur: bytes as libc::rlim_t,
        rlim_max: bytes as libc::rlim_t,
    };
    // SAFETY: `limit` is a fully initialised rlimit that lives across the
    // call, and a null old-limit pointer is accepted by prlimit(2).
    let rc = unsafe { libc::prlimit(pid, libc::RLIMIT_MEMLOCK, &limit, std::ptr::null_mut()) };
    if rc != 0 {
        return Err(VirtResError::Syscall {
            op: "prlimit(RLIMIT_MEMLOCK)",
            pid,
            value: format!("{bytes} bytes"),
            source: std::io::Error::last_os_error(),
        });
    }
    tracing::info!(pid, bytes, "memlock rlimit set");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: `prlimit(2)` requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn set_memlock_limit(_pid: i32, _bytes: u64) -> Result<()> {
    Err(VirtResError::Config {
        message: "Linux required for rlimit adjustment".into(),
    })
}
