//! Kernel calls that act on other processes and threads.
//!
//! Everything unsafe in the workspace lives below this module. Callers go
//! through the [`KernelOps`] trait so the runtime can be exercised against
//! a recording implementation instead of the live kernel.

pub mod rlimit;
pub mod sched;

use std::collections::BTreeSet;
use std::fmt;

use virtres_common::error::Result;

/// Set of host CPUs a thread may run on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CpuAffinity {
    cpus: BTreeSet<usize>,
}

impl CpuAffinity {
    /// CPU ids in ascending order.
    pub fn cpus(&self) -> impl Iterator<Item = usize> + '_ {
        self.cpus.iter().copied()
    }

    /// Returns `true` when no CPU is allowed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    /// Returns whether `cpu` is allowed.
    #[must_use]
    pub fn contains(&self, cpu: usize) -> bool {
        self.cpus.contains(&cpu)
    }
}

impl FromIterator<usize> for CpuAffinity {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            cpus: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for CpuAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<u32> = self.cpus().filter_map(|c| u32::try_from(c).ok()).collect();
        f.write_str(&crate::cpuset::format_cpuset(&ids))
    }
}

/// Kernel operations the resource controller performs on foreign pids.
///
/// Implementations never retry; a failure is reported with the target id
/// and the value that was being applied.
pub trait KernelOps {
    /// Sets the soft and hard `RLIMIT_MEMLOCK` of `pid` to `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`virtres_common::error::VirtResError::Syscall`] on failure.
    fn set_memlock_limit(&self, pid: i32, bytes: u64) -> Result<()>;

    /// Switches `tid` to `SCHED_FIFO` with the given priority.
    ///
    /// # Errors
    ///
    /// Returns [`virtres_common::error::VirtResError::Syscall`] on failure.
    fn set_fifo_priority(&self, tid: i32, priority: i32) -> Result<()>;

    /// Reads the CPU affinity of `tid`.
    ///
    /// # Errors
    ///
    /// Returns [`virtres_common::error::VirtResError::Syscall`] on failure.
    fn affinity(&self, tid: i32) -> Result<CpuAffinity>;

    /// Replaces the CPU affinity of `tid`.
    ///
    /// # Errors
    ///
    /// Returns [`virtres_common::error::VirtResError::Syscall`] on failure.
    fn set_affinity(&self, tid: i32, affinity: &CpuAffinity) -> Result<()>;
}

/// [`KernelOps`] backed by real system calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxKernel;

impl KernelOps for LinuxKernel {
    fn set_memlock_limit(&self, pid: i32, bytes: u64) -> Result<()> {
        rlimit::set_memlock_limit(pid, bytes)
    }

    fn set_fifo_priority(&self, tid: i32, priority: i32) -> Result<()> {
        sched::set_fifo_priority(tid, priority)
    }

    fn affinity(&self, tid: i32) -> Result<CpuAffinity> {
        sched::get_affinity(tid)
    }

    fn set_affinity(&self, tid: i32, affinity: &CpuAffinity) -> Result<()> {
        sched::set_affinity(tid, affinity)
    }
}
