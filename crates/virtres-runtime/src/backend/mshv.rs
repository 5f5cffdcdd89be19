//! Microsoft Hypervisor backends.
//!
//! Both variants drive QEMU through `/dev/mshv`. Neither has an
//! in-kernel PIT helper thread, so PIT alignment does not apply.

use virtres_common::constants::ARCH_ARM64;
use virtres_common::quantity::Quantity;
use virtres_common::types::HypervisorKind;

use super::HypervisorBackend;

/// QEMU on a Linux root partition of the Microsoft Hypervisor.
pub const MSHV: HypervisorBackend = HypervisorBackend {
    kind: HypervisorKind::Mshv,
    process_prefixes: &["qemu-system", "qemu-kvm"],
    vcpu_marker: "MSHV",
    device_name: "mshv",
    pit_thread_prefix: None,
    arch_overheads: &[(ARCH_ARM64, Quantity::mebibytes(128))],
};

/// QEMU in a Linux guest that runs as a layered partition on Hyper-V.
pub const HYPERV_LAYERED: HypervisorBackend = HypervisorBackend {
    kind: HypervisorKind::HypervLayered,
    ..MSHV
};
