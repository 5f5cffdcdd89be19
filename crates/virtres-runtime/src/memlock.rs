//! Locked-memory limit of the VM's hypervisor process.
//!
//! VFIO passthrough, SEV guests and realtime VMs pin guest memory, so the
//! process that will own that memory must be allowed to lock all of it
//! plus the infrastructure overhead.

use virtres_common::config::ControllerConfig;
use virtres_common::error::{Result, VirtResError};
use virtres_common::quantity::Quantity;
use virtres_common::types::{IsolationResult, VmSpec};
use virtres_core::process::{Process, ProcessSnapshot};

use crate::backend::HypervisorBackend;
use crate::controller::Host;
use crate::overhead::memory_overhead;

/// The VM pins guest memory and needs a raised `RLIMIT_MEMLOCK`.
#[must_use]
pub fn needs_memlock(vm: &VmSpec) -> bool {
    vm.is_vfio() || vm.is_realtime_enabled() || vm.is_sev()
}

/// Memory the target process must be able to lock: overhead plus guest
/// memory.
#[must_use]
pub fn memlock_size(
    vm: &VmSpec,
    backend: &HypervisorBackend,
    config: &ControllerConfig,
) -> Quantity {
    memory_overhead(vm, backend, &config.cpu_arch, config.overhead_ratio()) + vm.base_guest_memory()
}

/// Picks the process whose limit gets raised.
///
/// A running VM's limit goes on the hypervisor worker. Before that the
/// pre-fork manager is raised so the worker inherits the limit; if it is
/// not up yet the result is `None` and the caller retries later.
///
/// # Errors
///
/// Returns [`VirtResError::NotFound`] if the VM is running but no worker
/// is found.
pub fn memlock_target<'s>(
    snapshot: &'s ProcessSnapshot,
    vm: &VmSpec,
    isolation: &IsolationResult,
    backend: &HypervisorBackend,
) -> Result<Option<&'s Process>> {
    if vm.is_running() {
        snapshot
            .find_hypervisor_worker(isolation.parent_pid, backend.process_prefixes)
            .map(Some)
    } else {
        Ok(snapshot.find_prefork_manager(isolation.pid))
    }
}

/// Raises the locked-memory limit for `vm`, regardless of whether the VM
/// strictly needs it. Used directly by hot-plug and migration paths.
///
/// # Errors
///
/// Returns an error if the process table cannot be read, a running VM has
/// no worker, or the kernel rejects the new limit.
pub fn adjust_memlock(
    host: &Host<'_>,
    config: &ControllerConfig,
    vm: &VmSpec,
    isolation: &IsolationResult,
) -> Result<()> {
    let snapshot = host.procfs.snapshot()?;
    let Some(target) = memlock_target(&snapshot, vm, isolation, host.backend)? else {
        tracing::debug!(vm = %vm.name, launcher = isolation.pid, "pre-fork manager not up yet");
        return Ok(());
    };

    let size = memlock_size(vm, host.backend, config);
    let bytes = u64::try_from(size.value()).map_err(|_| VirtResError::Config {
        message: format!("negative memlock size {size} for {}", vm.name),
    })?;
    tracing::info!(
        vm = %vm.name,
        pid = target.pid,
        executable = %target.executable,
        size = %size,
        "raising memlock limit"
    );
    host.kernel.set_memlock_limit(target.pid, bytes)
}
