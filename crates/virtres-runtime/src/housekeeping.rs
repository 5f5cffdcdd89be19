//! Moves emulator and I/O threads of dedicated-CPU VMs out of the vCPUs'
//! way.
//!
//! A `housekeeping` child cgroup is pinned to the CPUs the domain reserves
//! for the emulator; every thread of the VM that is not a vCPU is moved
//! into it.

use virtres_common::constants::{CPUSET_SUBSYSTEM, HOUSEKEEPING_CGROUP};
use virtres_common::error::Result;
use virtres_common::types::{RenderedDomain, VmSpec};
use virtres_core::cgroup::CgroupManager;
use virtres_core::cpuset::parse_cpuset;
use virtres_core::process::ProcFs;

use crate::backend::HypervisorBackend;

/// Dedicated CPUs with an isolated emulator thread were requested.
#[must_use]
pub fn should_configure(vm: &VmSpec) -> bool {
    vm.is_cpu_dedicated() && vm.isolates_emulator_thread()
}

/// Creates the housekeeping cgroup, pins it to the domain's emulator CPUs
/// and moves every non-vCPU thread of the VM into it.
///
/// Without a rendered domain or an emulator pin only the cgroup is
/// created; a later pass finishes the job.
///
/// # Errors
///
/// Returns an error if the cgroup cannot be configured, the emulator pin
/// is not a valid cpuset, or a thread cannot be resolved or moved.
pub fn configure_housekeeping(
    procfs: &ProcFs,
    backend: &HypervisorBackend,
    cgroups: &dyn CgroupManager,
    vm: &VmSpec,
    domain: Option<&RenderedDomain>,
) -> Result<()> {
    cgroups.create_child_cgroup(HOUSEKEEPING_CGROUP, CPUSET_SUBSYSTEM)?;

    let Some(pin) = domain.and_then(|d| d.emulator_pin.as_deref()) else {
        tracing::debug!(vm = %vm.name, "no emulator pin rendered yet");
        return Ok(());
    };
    let cpus = parse_cpuset(pin)?;
    cgroups.set_cpuset(HOUSEKEEPING_CGROUP, &cpus)?;
    tracing::debug!(vm = %vm.name, cpus = pin, "housekeeping cpuset applied");

    let mut moved = Vec::new();
    for tid in cgroups.list_threads()? {
        let thread = procfs.process(tid)?;
        if backend.is_vcpu_thread(&thread.executable) {
            continue;
        }
        cgroups.attach_thread(CPUSET_SUBSYSTEM, HOUSEKEEPING_CGROUP, tid)?;
        moved.push(tid);
    }
    tracing::info!(vm = %vm.name, threads = ?moved, "housekeeping threads isolated");
    Ok(())
}
