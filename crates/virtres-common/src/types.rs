//! Domain primitive types used across the virtres workspace.
//!
//! [`VmSpec`] is the read-only view of a virtual machine the controller
//! works from. Field names follow the camelCase layout of VM manifests so
//! specs can be loaded straight from YAML or JSON.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VirtResError;
use crate::quantity::Quantity;

/// Hypervisor the VM's worker process runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HypervisorKind {
    /// Linux KVM.
    #[default]
    Kvm,
    /// Microsoft Hypervisor exposed through `/dev/mshv`.
    Mshv,
    /// Linux guest running as a layered (nested root) partition on Hyper-V.
    HypervLayered,
}

impl fmt::Display for HypervisorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kvm => write!(f, "kvm"),
            Self::Mshv => write!(f, "mshv"),
            Self::HypervLayered => write!(f, "hyperv-layered"),
        }
    }
}

impl FromStr for HypervisorKind {
    type Err = VirtResError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kvm" => Ok(Self::Kvm),
            "mshv" => Ok(Self::Mshv),
            "hyperv-layered" | "hypervlayered" => Ok(Self::HypervLayered),
            other => Err(VirtResError::Config {
                message: format!("unknown hypervisor: {other}"),
            }),
        }
    }
}

/// Lifecycle phase of a VM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Accepted but not yet scheduled.
    #[default]
    Pending,
    /// Waiting for the launcher to come up.
    Scheduling,
    /// Launcher is up, the domain is being started.
    Scheduled,
    /// The guest is running.
    Running,
    /// The guest shut down cleanly.
    Succeeded,
    /// The guest failed.
    Failed,
    /// State could not be determined.
    Unknown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Realtime settings of the guest CPU.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Realtime {
    /// vCPU mask selecting which vCPUs get realtime scheduling.
    /// Absent or empty selects every vCPU.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
}

/// Guest CPU topology and placement.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuSpec {
    /// Cores per socket (0 = unset).
    #[serde(default)]
    pub cores: u32,
    /// Sockets (0 = unset).
    #[serde(default)]
    pub sockets: u32,
    /// Threads per core (0 = unset).
    #[serde(default)]
    pub threads: u32,
    /// Pin each vCPU to a dedicated host CPU.
    #[serde(default)]
    pub dedicated_cpu_placement: bool,
    /// Give the emulator thread its own host CPU.
    #[serde(default)]
    pub isolate_emulator_thread: bool,
    /// Realtime tuning, if requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime: Option<Realtime>,
    /// Mirror host NUMA topology into the guest.
    #[serde(default)]
    pub numa_passthrough: bool,
}

impl CpuSpec {
    /// Returns `true` when any topology field is set.
    #[must_use]
    pub const fn has_topology(&self) -> bool {
        self.cores != 0 || self.sockets != 0 || self.threads != 0
    }

    /// Product of the non-zero topology fields; zero fields count as one.
    /// Saturates at `i64::MAX`.
    #[must_use]
    pub fn topology_vcpus(&self) -> i64 {
        [self.cores, self.sockets, self.threads]
            .into_iter()
            .filter(|&n| n != 0)
            .fold(1_i64, |acc, n| acc.saturating_mul(i64::from(n)))
    }
}

/// Guest memory settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySpec {
    /// Memory visible to the guest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest: Option<Quantity>,
    /// Upper bound for memory hotplug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_guest: Option<Quantity>,
    /// Operator-provided overhead added verbatim to the estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_overhead: Option<Quantity>,
}

/// CPU and memory amounts of a request or limit block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    /// CPU amount in cores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Quantity>,
    /// Memory amount in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Quantity>,
}

/// Resource requests and limits of the VM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// Guaranteed amounts.
    #[serde(default)]
    pub requests: ResourceList,
    /// Upper bounds.
    #[serde(default)]
    pub limits: ResourceList,
}

/// A GPU assigned to the guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gpu {
    /// Name of the device inside the VM spec.
    pub name: String,
    /// Resource name of the backing device.
    #[serde(default)]
    pub device_name: String,
}

/// A generic host device passed through to the guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDevice {
    /// Name of the device inside the VM spec.
    pub name: String,
    /// Resource name of the backing device.
    #[serde(default)]
    pub device_name: String,
}

/// How a guest interface is bound to the host network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterfaceBinding {
    /// Pod network bridge.
    #[default]
    Bridge,
    /// User-space masquerade.
    Masquerade,
    /// SR-IOV virtual function passed through via VFIO.
    Sriov,
}

/// A guest network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    /// Interface name.
    pub name: String,
    /// Host binding.
    #[serde(default)]
    pub binding: InterfaceBinding,
}

/// Virtual TPM device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tpm {
    /// Explicit on/off switch; absent means enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Devices attached to the guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Devices {
    /// Passthrough GPUs.
    #[serde(default)]
    pub gpus: Vec<Gpu>,
    /// Generic passthrough host devices.
    #[serde(default)]
    pub host_devices: Vec<HostDevice>,
    /// Network interfaces.
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    /// Virtual TPM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpm: Option<Tpm>,
    /// Attach a default graphics device; absent means yes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoattach_graphics_device: Option<bool>,
}

/// Confidential computing technology requested for the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchSecurity {
    /// AMD Secure Encrypted Virtualization.
    Sev,
    /// SEV with encrypted register state.
    SevEs,
    /// SEV with secure nested paging.
    Snp,
    /// Intel Trust Domain Extensions.
    Tdx,
}

/// Command run inside the guest by a probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecAction {
    /// Command line.
    #[serde(default)]
    pub command: Vec<String>,
}

/// Liveness or readiness probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    /// Exec handler; only exec probes spawn a helper on the host side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecAction>,
    /// Guest agent ping handler.
    #[serde(default)]
    pub guest_agent_ping: bool,
}

impl Probe {
    /// Returns `true` when this probe runs a command.
    #[must_use]
    pub const fn is_exec(&self) -> bool {
        self.exec.is_some()
    }
}

/// A volume attached to the VM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Volume name.
    pub name: String,
    /// Whether the volume exposes host metrics to the guest.
    #[serde(default)]
    pub downward_metrics: bool,
}

/// Read-only view of a virtual machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmSpec {
    /// VM name, used in logs.
    #[serde(default)]
    pub name: String,
    /// Namespace the VM lives in.
    #[serde(default)]
    pub namespace: String,
    /// CPU topology and placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuSpec>,
    /// Guest memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemorySpec>,
    /// Resource requests and limits.
    #[serde(default)]
    pub resources: ResourceRequirements,
    /// Attached devices.
    #[serde(default)]
    pub devices: Devices,
    /// Confidential computing technology.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_security: Option<LaunchSecurity>,
    /// Liveness probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,
    /// Readiness probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
    /// Volumes.
    #[serde(default)]
    pub volumes: Vec<Volume>,
    /// Current lifecycle phase.
    #[serde(default)]
    pub phase: Phase,
}

impl VmSpec {
    /// The guest is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    /// The guest reached a terminal phase.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self.phase, Phase::Succeeded | Phase::Failed)
    }

    /// Dedicated host CPUs were requested.
    #[must_use]
    pub fn is_cpu_dedicated(&self) -> bool {
        self.cpu.as_ref().is_some_and(|c| c.dedicated_cpu_placement)
    }

    /// The emulator thread should be isolated from vCPUs.
    #[must_use]
    pub fn isolates_emulator_thread(&self) -> bool {
        self.cpu.as_ref().is_some_and(|c| c.isolate_emulator_thread)
    }

    /// Realtime vCPU scheduling was requested.
    #[must_use]
    pub fn is_realtime_enabled(&self) -> bool {
        self.cpu.as_ref().is_some_and(|c| c.realtime.is_some())
    }

    /// The realtime vCPU mask, empty when every vCPU is realtime.
    #[must_use]
    pub fn realtime_mask(&self) -> &str {
        self.cpu
            .as_ref()
            .and_then(|c| c.realtime.as_ref())
            .and_then(|r| r.mask.as_deref())
            .unwrap_or("")
    }

    /// Requested guest memory, zero when unset.
    #[must_use]
    pub fn memory_request(&self) -> Quantity {
        self.resources.requests.memory.unwrap_or_default()
    }

    /// Non-zero CPU and memory requests equal to their limits.
    #[must_use]
    pub fn wants_guaranteed_qos(&self) -> bool {
        let ResourceRequirements { requests, limits } = &self.resources;
        let matches = |req: Option<Quantity>, lim: Option<Quantity>| {
            req.is_some_and(|r| !r.is_zero() && Some(r) == lim)
        };
        matches(requests.memory, limits.memory) && matches(requests.cpu, limits.cpu)
    }

    /// Any device that needs VFIO passthrough is attached.
    #[must_use]
    pub fn is_vfio(&self) -> bool {
        !self.devices.host_devices.is_empty()
            || !self.devices.gpus.is_empty()
            || self
                .devices
                .interfaces
                .iter()
                .any(|i| i.binding == InterfaceBinding::Sriov)
    }

    /// AMD SEV, SEV-ES, or SEV-SNP is requested.
    #[must_use]
    pub const fn is_sev(&self) -> bool {
        matches!(
            self.launch_security,
            Some(LaunchSecurity::Sev | LaunchSecurity::SevEs | LaunchSecurity::Snp)
        )
    }

    /// A TPM is attached and not switched off.
    #[must_use]
    pub fn has_enabled_tpm(&self) -> bool {
        self.devices.tpm.as_ref().is_some_and(|t| t.enabled != Some(false))
    }

    /// A default graphics device will be attached.
    #[must_use]
    pub fn autoattaches_graphics(&self) -> bool {
        self.devices.autoattach_graphics_device != Some(false)
    }

    /// A downward-metrics volume is present.
    #[must_use]
    pub fn has_downward_metrics_volume(&self) -> bool {
        self.volumes.iter().any(|v| v.downward_metrics)
    }

    /// Number of configured exec probes (0, 1, or 2).
    #[must_use]
    pub fn exec_probe_count(&self) -> usize {
        [&self.liveness_probe, &self.readiness_probe]
            .into_iter()
            .filter(|p| p.as_ref().is_some_and(Probe::is_exec))
            .count()
    }

    /// Operator-provided overhead, if any.
    #[must_use]
    pub fn reserved_overhead(&self) -> Option<Quantity> {
        self.memory.as_ref().and_then(|m| m.reserved_overhead)
    }

    /// Guest memory the locked-memory limit is sized for.
    ///
    /// Precedence: non-zero max-guest, then non-zero guest, then the memory
    /// request (zero when absent).
    #[must_use]
    pub fn base_guest_memory(&self) -> Quantity {
        let non_zero = |q: Option<Quantity>| q.filter(|q| !q.is_zero());
        self.memory
            .as_ref()
            .and_then(|m| non_zero(m.max_guest).or_else(|| non_zero(m.guest)))
            .unwrap_or_else(|| self.memory_request())
    }
}

/// Fields of the rendered domain description this crate reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedDomain {
    /// Host CPUs the emulator thread is pinned to, in cpuset list form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emulator_pin: Option<String>,
}

/// Pids describing where a VM's isolated process tree lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolationResult {
    /// Launcher process; parent of the pre-fork manager.
    pub pid: i32,
    /// Root of the isolated tree; parent of the hypervisor worker.
    pub parent_pid: i32,
}
