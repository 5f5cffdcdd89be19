//! Realtime scheduling of vCPU threads.
//!
//! Runs once while the VM is being brought up: every vCPU selected by the
//! realtime mask is switched to `SCHED_FIFO`.

use virtres_common::constants::VCPU_FIFO_PRIORITY;
use virtres_common::error::Result;
use virtres_common::types::{IsolationResult, VmSpec};
use virtres_core::cpumask::CpuMask;
use virtres_core::process::ProcessSnapshot;

use crate::controller::Host;

/// Realtime was requested and the VM is still coming up.
#[must_use]
pub fn should_schedule(vm: &VmSpec) -> bool {
    vm.is_realtime_enabled() && !vm.is_running() && !vm.is_final()
}

/// Gives every vCPU enabled by the VM's realtime mask FIFO priority 1.
///
/// # Errors
///
/// Returns an error if the worker or its threads cannot be found, the mask
/// is malformed, or a scheduling call fails. The first failure aborts.
pub fn schedule_vcpus(
    host: &Host<'_>,
    snapshot: &ProcessSnapshot,
    vm: &VmSpec,
    isolation: &IsolationResult,
) -> Result<()> {
    let worker =
        snapshot.find_hypervisor_worker(isolation.parent_pid, host.backend.process_prefixes)?;
    let vcpus = host.procfs.vcpu_threads(worker.pid, host.backend.vcpu_marker)?;
    let mask = CpuMask::parse(vm.realtime_mask())?;

    for (&vcpu, &tid) in &vcpus {
        if !mask.is_enabled(vcpu) {
            tracing::debug!(vm = %vm.name, vcpu, tid, "vCPU left out of realtime mask");
            continue;
        }
        host.kernel.set_fifo_priority(tid, VCPU_FIFO_PRIORITY)?;
        tracing::info!(vm = %vm.name, vcpu, tid, "vCPU switched to realtime");
    }
    Ok(())
}
