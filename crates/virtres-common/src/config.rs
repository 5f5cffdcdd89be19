//! Node-level configuration passed explicitly into every controller call.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::HypervisorKind;

/// Root configuration for the resource controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    /// Mount point of the process filesystem.
    pub proc_root: PathBuf,
    /// Mount point of the cgroup hierarchy.
    pub cgroup_root: PathBuf,
    /// Host CPU architecture name (`amd64`, `arm64`, `s390x`).
    pub cpu_arch: String,
    /// Hypervisor the node runs VMs on.
    pub hypervisor: HypervisorKind,
    /// Multiplier applied to the estimated infrastructure overhead.
    pub additional_guest_memory_overhead_ratio: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from(crate::constants::DEFAULT_PROC_ROOT),
            cgroup_root: PathBuf::from(crate::constants::CGROUP_ROOT),
            cpu_arch: crate::constants::host_arch().to_string(),
            hypervisor: HypervisorKind::default(),
            additional_guest_memory_overhead_ratio: None,
        }
    }
}

impl ControllerConfig {
    /// The overhead ratio, treating an empty string as unset.
    #[must_use]
    pub fn overhead_ratio(&self) -> Option<&str> {
        self.additional_guest_memory_overhead_ratio
            .as_deref()
            .filter(|r| !r.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_host_mounts() {
        let cfg = ControllerConfig::default();
        assert_eq!(cfg.proc_root, PathBuf::from("/proc"));
        assert_eq!(cfg.cgroup_root, PathBuf::from("/sys/fs/cgroup"));
        assert_eq!(cfg.hypervisor, HypervisorKind::Kvm);
        assert!(cfg.overhead_ratio().is_none());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: ControllerConfig = serde_json::from_str(
            r#"{"hypervisor":"mshv","additionalGuestMemoryOverheadRatio":"1.5"}"#,
        )
        .expect("parse config");
        assert_eq!(cfg.hypervisor, HypervisorKind::Mshv);
        assert_eq!(cfg.overhead_ratio(), Some("1.5"));
        assert_eq!(cfg.proc_root, PathBuf::from("/proc"));
    }

    #[test]
    fn blank_ratio_is_unset() {
        let cfg = ControllerConfig {
            additional_guest_memory_overhead_ratio: Some("  ".into()),
            ..ControllerConfig::default()
        };
        assert!(cfg.overhead_ratio().is_none());
    }
}
