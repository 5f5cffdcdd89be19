//! Hypervisor backend capability records.
//!
//! Every algorithm in this crate is written once and parameterized over a
//! [`HypervisorBackend`]: the process-name prefixes of the worker, the
//! vCPU thread marker, the PIT helper thread (if the hypervisor has one),
//! and per-architecture memory overheads.

pub mod kvm;
pub mod mshv;

use std::path::PathBuf;

use virtres_common::quantity::Quantity;
use virtres_common::types::HypervisorKind;

/// Per-hypervisor constants shared by every VM on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HypervisorBackend {
    /// Which hypervisor this record describes.
    pub kind: HypervisorKind,
    /// Executable prefixes of the hypervisor worker, most specific first.
    pub process_prefixes: &'static [&'static str],
    /// Token after `CPU <n>/` in vCPU thread names.
    pub vcpu_marker: &'static str,
    /// Device node name under `/dev`.
    pub device_name: &'static str,
    /// Name prefix of the in-kernel PIT helper thread, if one exists.
    pub pit_thread_prefix: Option<&'static str>,
    /// Extra memory per host architecture.
    pub arch_overheads: &'static [(&'static str, Quantity)],
}

impl HypervisorBackend {
    /// Returns the capability record for `kind`.
    #[must_use]
    pub const fn for_kind(kind: HypervisorKind) -> &'static Self {
        match kind {
            HypervisorKind::Kvm => &kvm::KVM,
            HypervisorKind::Mshv => &mshv::MSHV,
            HypervisorKind::HypervLayered => &mshv::HYPERV_LAYERED,
        }
    }

    /// Extra memory needed on `cpu_arch`, zero for unlisted architectures.
    #[must_use]
    pub fn arch_overhead(&self, cpu_arch: &str) -> Quantity {
        self.arch_overheads
            .iter()
            .find(|(arch, _)| *arch == cpu_arch)
            .map_or(Quantity::ZERO, |(_, q)| *q)
    }

    /// Name of the PIT helper thread serving the worker whose namespaced
    /// pid is `nspid`.
    #[must_use]
    pub fn pit_thread_name(&self, nspid: i32) -> Option<String> {
        self.pit_thread_prefix.map(|prefix| format!("{prefix}/{nspid}"))
    }

    /// Returns `true` if `comm` names one of this hypervisor's vCPU
    /// threads.
    #[must_use]
    pub fn is_vcpu_thread(&self, comm: &str) -> bool {
        comm.contains("CPU ") && comm.contains(self.vcpu_marker)
    }

    /// Path of the hypervisor device node.
    #[must_use]
    pub fn device_path(&self) -> PathBuf {
        PathBuf::from("/dev").join(self.device_name)
    }
}
