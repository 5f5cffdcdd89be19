//! Aligns the in-kernel PIT helper thread with vCPU 0.
//!
//! KVM services the emulated PIT from a kernel thread named
//! `kvm-pit/<pid>`, where the pid is the worker's pid inside its
//! namespace. Dedicated-CPU VMs get that thread pinned wherever vCPU 0
//! runs, and realtime VMs also get it a FIFO priority above the vCPUs.

use virtres_common::constants::PIT_FIFO_PRIORITY;
use virtres_common::error::Result;
use virtres_common::types::{IsolationResult, VmSpec};
use virtres_core::process::ProcessSnapshot;

use crate::controller::Host;

/// Dedicated CPUs were requested and the VM is still coming up.
#[must_use]
pub fn should_align(vm: &VmSpec) -> bool {
    vm.is_cpu_dedicated() && !vm.is_running() && !vm.is_final()
}

/// Copies vCPU 0's affinity onto the PIT thread.
///
/// Backends without a PIT thread, a PIT thread that does not exist yet,
/// and a missing vCPU 0 all leave the host untouched.
///
/// # Errors
///
/// Returns an error if the worker cannot be found, its namespaced pid is
/// unreadable, or a kernel call fails.
pub fn align_pit_thread(
    host: &Host<'_>,
    snapshot: &ProcessSnapshot,
    vm: &VmSpec,
    isolation: &IsolationResult,
) -> Result<()> {
    if host.backend.pit_thread_prefix.is_none() {
        tracing::debug!(vm = %vm.name, hypervisor = %host.backend.kind, "no PIT thread to align");
        return Ok(());
    }

    let worker =
        snapshot.find_hypervisor_worker(isolation.parent_pid, host.backend.process_prefixes)?;
    let nspid = host.procfs.namespaced_pid(worker.pid)?;
    let Some(pit) = host
        .backend
        .pit_thread_name(nspid)
        .and_then(|name| snapshot.find_by_exact_name(&name))
    else {
        tracing::debug!(vm = %vm.name, nspid, "PIT thread not found");
        return Ok(());
    };

    if vm.is_realtime_enabled() {
        host.kernel.set_fifo_priority(pit.pid, PIT_FIFO_PRIORITY)?;
    }

    let vcpus = host.procfs.vcpu_threads(worker.pid, host.backend.vcpu_marker)?;
    let Some(&vcpu0) = vcpus.get(&0) else {
        tracing::debug!(vm = %vm.name, worker = worker.pid, "vCPU 0 not found");
        return Ok(());
    };

    let affinity = host.kernel.affinity(vcpu0)?;
    host.kernel.set_affinity(pit.pid, &affinity)?;
    tracing::info!(vm = %vm.name, pit = pit.pid, cpus = %affinity, "PIT thread aligned with vCPU 0");
    Ok(())
}
