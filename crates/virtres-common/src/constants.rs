//! System-wide constants and default paths.

/// Default mount point of the process filesystem.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Cgroup hierarchy mount point (v2 unified or v1 controller parent).
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Executable name of the pre-fork manager spawned by the launcher.
pub const PREFORK_MANAGER_NAME: &str = "virtqemud";

/// Name of the child cgroup holding emulator and housekeeping threads.
pub const HOUSEKEEPING_CGROUP: &str = "housekeeping";

/// Cgroup controller the housekeeping child is created under.
pub const CPUSET_SUBSYSTEM: &str = "cpuset";

/// `SCHED_FIFO` priority given to realtime vCPU threads.
pub const VCPU_FIFO_PRIORITY: i32 = 1;

/// `SCHED_FIFO` priority given to the PIT helper thread of realtime VMs.
pub const PIT_FIFO_PRIORITY: i32 = 2;

/// Upper bound on the number of ids a cpuset list may expand to.
pub const MAX_CPUSET_ENTRIES: usize = 100;

/// Architecture name for 64-bit ARM hosts.
pub const ARCH_ARM64: &str = "arm64";

/// Architecture name for 64-bit x86 hosts.
pub const ARCH_AMD64: &str = "amd64";

/// Architecture name for IBM Z hosts.
pub const ARCH_S390X: &str = "s390x";

/// Application name used in CLI output.
pub const APP_NAME: &str = "virtres";

/// Maps the compile-time target architecture onto the names VM specs use.
#[must_use]
pub const fn host_arch() -> &'static str {
    if cfg!(target_arch = "aarch64") {
        ARCH_ARM64
    } else if cfg!(target_arch = "s390x") {
        ARCH_S390X
    } else {
        ARCH_AMD64
    }
}
