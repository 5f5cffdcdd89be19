//! Host memory the hypervisor process tree needs beyond guest RAM.
//!
//! The estimate is a sum of fixed and VM-dependent terms, optionally scaled
//! by an operator ratio. All terms are added in whole kilo units; floating
//! point only appears in the final ratio step.

use serde::Serialize;
use virtres_common::quantity::Quantity;
use virtres_common::types::VmSpec;

use crate::backend::HypervisorBackend;

/// Resident set of the launcher's process monitor.
const MONITOR_OVERHEAD: Quantity = Quantity::mebibytes(25);
/// Resident set of the launcher itself.
const LAUNCHER_OVERHEAD: Quantity = Quantity::mebibytes(100);
/// Resident set of the log daemon.
const LOG_DAEMON_OVERHEAD: Quantity = Quantity::mebibytes(25);
/// Resident set of the pre-fork manager.
const PREFORK_MANAGER_OVERHEAD: Quantity = Quantity::mebibytes(40);
/// Resident set of the hypervisor worker, excluding guest RAM.
const WORKER_OVERHEAD: Quantity = Quantity::mebibytes(30);
const PER_VCPU_OVERHEAD: Quantity = Quantity::mebibytes(8);
const IOTHREAD_OVERHEAD: Quantity = Quantity::mebibytes(8);
const VIDEO_RAM_OVERHEAD: Quantity = Quantity::mebibytes(32);
/// MMIO window that VFIO locks in addition to guest RAM.
const VFIO_OVERHEAD: Quantity = Quantity::gibibytes(1);
const DOWNWARD_METRICS_OVERHEAD: Quantity = Quantity::mebibytes(1);
const EXEC_PROBE_OVERHEAD: Quantity = Quantity::mebibytes(10);
const EXEC_PROBE_BASE_OVERHEAD: Quantity = Quantity::mebibytes(100);
const SEV_OVERHEAD: Quantity = Quantity::mebibytes(256);
/// Resident set of the software TPM process.
const TPM_OVERHEAD: Quantity = Quantity::mebibytes(53);
const DEDICATED_OVERHEAD: Quantity = Quantity::mebibytes(100);

/// One named term of the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverheadItem {
    /// Short name of the term.
    pub name: &'static str,
    /// Amount it contributes.
    pub quantity: Quantity,
}

/// Itemized overhead estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverheadReport {
    /// Terms in the order they were added, the ratio term last.
    pub items: Vec<OverheadItem>,
    /// Ratio that was applied, if any.
    pub ratio: Option<f64>,
    /// Sum of all terms.
    pub total: Quantity,
}

impl OverheadReport {
    fn push(&mut self, name: &'static str, quantity: Quantity) {
        self.total += quantity;
        self.items.push(OverheadItem { name, quantity });
    }
}

/// Number of vCPUs the guest gets.
///
/// The product of the non-zero topology fields when any is set; otherwise
/// the CPU limit, else the CPU request, rounded up. Never less than one.
#[must_use]
pub fn vcpu_count(vm: &VmSpec) -> i64 {
    let count = match vm.cpu.as_ref().filter(|c| c.has_topology()) {
        Some(cpu) => cpu.topology_vcpus(),
        None => {
            let resources = &vm.resources;
            resources
                .limits
                .cpu
                .or(resources.requests.cpu)
                .map_or(0, |q| q.value())
        }
    };
    count.max(1)
}

/// Page-table memory: one byte per 512 bytes of requested memory, taken
/// from the request rounded up to whole kilo units.
fn page_table_overhead(request: Quantity) -> Quantity {
    Quantity::from_value(request.scaled_kilo().saturating_mul(1000) / 512)
}

/// Scales `total` by `ratio`, adding `trunc(kilo(total) * (ratio - 1))`
/// kilo units.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn ratio_addition(total: Quantity, ratio: f64) -> Quantity {
    let extra = (total.scaled_kilo() as f64 * (ratio - 1.0)).trunc();
    Quantity::from_scaled_kilo(extra as i64)
}

/// Computes the itemized overhead of `vm`.
///
/// A ratio that does not parse as a float is logged and ignored.
#[must_use]
pub fn overhead_report(
    vm: &VmSpec,
    backend: &HypervisorBackend,
    cpu_arch: &str,
    ratio: Option<&str>,
) -> OverheadReport {
    let mut report = OverheadReport {
        items: Vec::new(),
        ratio: None,
        total: Quantity::ZERO,
    };

    report.push("page tables", page_table_overhead(vm.memory_request()));
    report.push("monitor", MONITOR_OVERHEAD);
    report.push("launcher", LAUNCHER_OVERHEAD);
    report.push("log daemon", LOG_DAEMON_OVERHEAD);
    report.push("pre-fork manager", PREFORK_MANAGER_OVERHEAD);
    report.push("hypervisor worker", WORKER_OVERHEAD);
    report.push("vcpus", PER_VCPU_OVERHEAD.times(vcpu_count(vm)));
    report.push("iothread", IOTHREAD_OVERHEAD);

    if vm.autoattaches_graphics() {
        report.push("video ram", VIDEO_RAM_OVERHEAD);
    }
    let arch = backend.arch_overhead(cpu_arch);
    if !arch.is_zero() {
        report.push("architecture", arch);
    }
    if vm.is_vfio() {
        report.push("vfio", VFIO_OVERHEAD);
    }
    if vm.has_downward_metrics_volume() {
        report.push("downward metrics", DOWNWARD_METRICS_OVERHEAD);
    }
    let probes = vm.exec_probe_count();
    if probes > 0 {
        let per_probe = i64::try_from(probes).unwrap_or(i64::MAX);
        report.push(
            "exec probes",
            EXEC_PROBE_OVERHEAD.times(per_probe) + EXEC_PROBE_BASE_OVERHEAD,
        );
    }
    if vm.is_sev() {
        report.push("sev", SEV_OVERHEAD);
    }
    if vm.has_enabled_tpm() {
        report.push("tpm", TPM_OVERHEAD);
    }
    if vm.is_cpu_dedicated() || vm.wants_guaranteed_qos() {
        report.push("dedicated cpu", DEDICATED_OVERHEAD);
    }
    if let Some(reserved) = vm.reserved_overhead() {
        report.push("reserved", reserved);
    }

    if let Some(raw) = ratio.map(str::trim).filter(|r| !r.is_empty()) {
        match raw.parse::<f64>() {
            Ok(ratio) => {
                let extra = ratio_addition(report.total, ratio);
                report.push("ratio", extra);
                report.ratio = Some(ratio);
            }
            Err(e) => {
                tracing::warn!(
                    vm = %vm.name,
                    ratio = raw,
                    error = %e,
                    "ignoring unparsable memory overhead ratio"
                );
            }
        }
    }

    tracing::debug!(
        vm = %vm.name,
        total = %report.total,
        terms = report.items.len(),
        "memory overhead computed"
    );
    report
}

/// Total memory overhead of `vm`. See [`overhead_report`].
#[must_use]
pub fn memory_overhead(
    vm: &VmSpec,
    backend: &HypervisorBackend,
    cpu_arch: &str,
    ratio: Option<&str>,
) -> Quantity {
    overhead_report(vm, backend, cpu_arch, ratio).total
}

#[cfg(test)]
mod tests {
    use virtres_common::types::{
        CpuSpec, ExecAction, Gpu, HostDevice, HypervisorKind, Interface,
        InterfaceBinding, LaunchSecurity, MemorySpec, Probe, Tpm, Volume,
    };

    use super::*;

    fn q(s: &str) -> Quantity {
        s.parse().expect("quantity")
    }

    fn kvm() -> &'static HypervisorBackend {
        HypervisorBackend::for_kind(HypervisorKind::Kvm)
    }

    fn vm_with_memory(request: &str) -> VmSpec {
        let mut vm = VmSpec::default();
        vm.resources.requests.memory = Some(q(request));
        vm
    }

    fn baseline() -> Quantity {
        memory_overhead(&vm_with_memory("1Gi"), kvm(), "amd64", None)
    }

    fn exec_probe() -> Option<Probe> {
        Some(Probe {
            exec: Some(ExecAction {
                command: vec!["true".into()],
            }),
            guest_agent_ping: false,
        })
    }

    #[test]
    fn vcpus_from_topology() {
        let mut vm = VmSpec::default();
        let cases = [((2, 2, 2), 8), ((0, 2, 0), 2), ((2, 0, 2), 4)];
        for ((cores, sockets, threads), want) in cases {
            vm.cpu = Some(CpuSpec {
                cores,
                sockets,
                threads,
                ..CpuSpec::default()
            });
            assert_eq!(vcpu_count(&vm), want, "{cores}/{sockets}/{threads}");
        }
    }

    #[test]
    fn vcpus_from_resources_prefer_limit() {
        let mut vm = VmSpec::default();
        vm.resources.requests.cpu = Some(q("3"));
        assert_eq!(vcpu_count(&vm), 3);
        vm.resources.limits.cpu = Some(q("5"));
        assert_eq!(vcpu_count(&vm), 5);
    }

    #[test]
    fn vcpus_round_up_and_never_zero() {
        let mut vm = VmSpec::default();
        assert_eq!(vcpu_count(&vm), 1);
        vm.resources.requests.cpu = Some(q("500m"));
        assert_eq!(vcpu_count(&vm), 1);
        vm.resources.requests.cpu = Some(q("1500m"));
        assert_eq!(vcpu_count(&vm), 2);
        vm.cpu = Some(CpuSpec::default());
        assert_eq!(vcpu_count(&vm), 2, "empty topology falls back to resources");
    }

    #[test]
    fn page_tables_from_kilo_scaled_request() {
        assert_eq!(page_table_overhead(q("1Gi")), Quantity::mebibytes(2));
        assert_eq!(page_table_overhead(Quantity::ZERO), Quantity::ZERO);
        // 1000 bytes -> 1 kilo -> 1000 / 512
        assert_eq!(page_table_overhead(q("1000")), Quantity::from_value(1));
    }

    #[test]
    fn baseline_for_one_gibibyte() {
        // page tables 2Mi + fixed 220Mi + one vCPU 8Mi + iothread 8Mi + video 32Mi
        assert_eq!(baseline(), Quantity::mebibytes(270));
    }

    #[test]
    fn report_items_sum_to_total() {
        let report = overhead_report(&vm_with_memory("1Gi"), kvm(), "amd64", Some("1.5"));
        let sum: Quantity = report.items.iter().map(|i| i.quantity).sum();
        assert_eq!(sum, report.total);
        assert_eq!(report.items.last().map(|i| i.name), Some("ratio"));
        assert_eq!(report.ratio, Some(1.5));
    }

    #[test]
    fn video_ram_dropped_when_graphics_disabled() {
        let mut vm = vm_with_memory("1Gi");
        vm.devices.autoattach_graphics_device = Some(false);
        assert_eq!(
            memory_overhead(&vm, kvm(), "amd64", None),
            Quantity::mebibytes(270 - 32)
        );
        vm.devices.autoattach_graphics_device = Some(true);
        assert_eq!(memory_overhead(&vm, kvm(), "amd64", None), baseline());
    }

    #[test]
    fn arm64_adds_firmware_flash() {
        let vm = vm_with_memory("1Gi");
        assert_eq!(
            memory_overhead(&vm, kvm(), "arm64", None),
            baseline() + Quantity::mebibytes(128)
        );
        assert_eq!(memory_overhead(&vm, kvm(), "s390x", None), baseline());
    }

    #[test]
    fn any_passthrough_device_adds_one_gibibyte() {
        let want = baseline() + Quantity::gibibytes(1);

        let mut vm = vm_with_memory("1Gi");
        vm.devices.host_devices.push(HostDevice {
            name: "nic".into(),
            device_name: "vendor/nic".into(),
        });
        assert_eq!(memory_overhead(&vm, kvm(), "amd64", None), want);

        let mut vm = vm_with_memory("1Gi");
        vm.devices.gpus.push(Gpu {
            name: "gpu".into(),
            device_name: "nvidia/gpu".into(),
        });
        assert_eq!(memory_overhead(&vm, kvm(), "amd64", None), want);

        let mut vm = vm_with_memory("1Gi");
        vm.devices.interfaces.push(Interface {
            name: "sriov".into(),
            binding: InterfaceBinding::Sriov,
        });
        assert_eq!(memory_overhead(&vm, kvm(), "amd64", None), want);

        let mut vm = vm_with_memory("1Gi");
        vm.devices.interfaces.push(Interface {
            name: "default".into(),
            binding: InterfaceBinding::Masquerade,
        });
        assert_eq!(memory_overhead(&vm, kvm(), "amd64", None), baseline());
    }

    #[test]
    fn exec_probe_base_counted_once() {
        let mut vm = vm_with_memory("1Gi");
        vm.liveness_probe = exec_probe();
        assert_eq!(
            memory_overhead(&vm, kvm(), "amd64", None),
            baseline() + Quantity::mebibytes(110)
        );
        vm.readiness_probe = exec_probe();
        assert_eq!(
            memory_overhead(&vm, kvm(), "amd64", None),
            baseline() + Quantity::mebibytes(120)
        );
        vm.readiness_probe = Some(Probe {
            exec: None,
            guest_agent_ping: true,
        });
        assert_eq!(
            memory_overhead(&vm, kvm(), "amd64", None),
            baseline() + Quantity::mebibytes(110)
        );
    }

    #[test]
    fn optional_device_terms() {
        let mut vm = vm_with_memory("1Gi");
        vm.volumes.push(Volume {
            name: "metrics".into(),
            downward_metrics: true,
        });
        vm.launch_security = Some(LaunchSecurity::SevEs);
        vm.devices.tpm = Some(Tpm { enabled: None });
        assert_eq!(
            memory_overhead(&vm, kvm(), "amd64", None),
            baseline() + Quantity::mebibytes(1 + 256 + 53)
        );

        vm.launch_security = Some(LaunchSecurity::Tdx);
        vm.devices.tpm = Some(Tpm {
            enabled: Some(false),
        });
        assert_eq!(
            memory_overhead(&vm, kvm(), "amd64", None),
            baseline() + Quantity::mebibytes(1)
        );
    }

    #[test]
    fn dedicated_or_guaranteed_adds_once() {
        let mut vm = vm_with_memory("1Gi");
        vm.cpu = Some(CpuSpec {
            dedicated_cpu_placement: true,
            ..CpuSpec::default()
        });
        assert_eq!(
            memory_overhead(&vm, kvm(), "amd64", None),
            baseline() + Quantity::mebibytes(100)
        );

        let mut vm = vm_with_memory("1Gi");
        vm.resources.limits.memory = Some(q("1Gi"));
        vm.resources.requests.cpu = Some(q("1"));
        vm.resources.limits.cpu = Some(q("1"));
        assert_eq!(
            memory_overhead(&vm, kvm(), "amd64", None),
            baseline() + Quantity::mebibytes(100)
        );
    }

    #[test]
    fn reserved_literal_added_verbatim() {
        let mut vm = vm_with_memory("1Gi");
        vm.memory = Some(MemorySpec {
            reserved_overhead: Some(q("1500k")),
            ..MemorySpec::default()
        });
        assert_eq!(
            memory_overhead(&vm, kvm(), "amd64", None),
            baseline() + q("1500k")
        );
    }

    #[test]
    fn huge_topology_saturates_vcpu_count() {
        let mut vm = vm_with_memory("1Gi");
        vm.cpu = Some(CpuSpec {
            cores: u32::MAX,
            sockets: u32::MAX,
            threads: u32::MAX,
            ..CpuSpec::default()
        });
        assert_eq!(vcpu_count(&vm), i64::MAX);
        assert!(memory_overhead(&vm, kvm(), "amd64", None) > baseline());
    }

    #[test]
    fn reserved_at_range_limit_saturates_total() {
        let mut vm = vm_with_memory("1Gi");
        vm.memory = Some(MemorySpec {
            reserved_overhead: Some(q("170141183460469231731687303715884105727m")),
            ..MemorySpec::default()
        });
        let total = memory_overhead(&vm, kvm(), "amd64", None);
        assert_eq!(total.millis(), i128::MAX);
        assert_eq!(total.value(), i64::MAX);
        let scaled = memory_overhead(&vm, kvm(), "amd64", Some("2.0"));
        assert_eq!(scaled.millis(), i128::MAX);
    }

    #[test]
    fn ratio_scales_whole_total() {
        let vm = vm_with_memory("1Gi");
        let base = baseline();
        let scaled = memory_overhead(&vm, kvm(), "amd64", Some("3.2"));
        let extra = (base.scaled_kilo() * 22) / 10;
        assert_eq!(scaled, base + Quantity::from_scaled_kilo(extra));
        assert!(scaled > base.times(3));
    }

    #[test]
    fn bad_or_empty_ratio_is_ignored() {
        let vm = vm_with_memory("1Gi");
        assert_eq!(memory_overhead(&vm, kvm(), "amd64", Some("no_float")), baseline());
        assert_eq!(memory_overhead(&vm, kvm(), "amd64", Some("")), baseline());
        assert_eq!(memory_overhead(&vm, kvm(), "amd64", Some("1.0")), baseline());
    }

    #[test]
    fn mshv_shares_the_arm64_table() {
        let vm = vm_with_memory("1Gi");
        let mshv = HypervisorBackend::for_kind(HypervisorKind::Mshv);
        assert_eq!(
            memory_overhead(&vm, mshv, "arm64", None),
            memory_overhead(&vm, kvm(), "arm64", None)
        );
    }
}
