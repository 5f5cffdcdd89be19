//! Linux KVM backend.

use virtres_common::constants::ARCH_ARM64;
use virtres_common::quantity::Quantity;
use virtres_common::types::HypervisorKind;

use super::HypervisorBackend;

/// QEMU on `/dev/kvm`.
///
/// On arm64 the UEFI firmware maps two 64Mi pflash regions.
pub const KVM: HypervisorBackend = HypervisorBackend {
    kind: HypervisorKind::Kvm,
    process_prefixes: &["qemu-system", "qemu-kvm"],
    vcpu_marker: "KVM",
    device_name: "kvm",
    pit_thread_prefix: Some("kvm-pit"),
    arch_overheads: &[(ARCH_ARM64, Quantity::mebibytes(128))],
};
