//! Lookup of where a VM's process tree lives on the host.

use virtres_common::error::Result;
use virtres_common::types::{IsolationResult, VmSpec};

/// Maps a VM to the launcher and isolated-root pids of its process tree.
///
/// Implemented by the node agent, which knows how pods map to host pids.
pub trait IsolationDetector {
    /// Resolves the process tree of `vm`.
    ///
    /// # Errors
    ///
    /// Returns an error if the VM's processes cannot be located.
    fn detect(&self, vm: &VmSpec) -> Result<IsolationResult>;
}

/// Detector that returns pids known up front, e.g. from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownIsolation(pub IsolationResult);

impl IsolationDetector for KnownIsolation {
    fn detect(&self, vm: &VmSpec) -> Result<IsolationResult> {
        tracing::debug!(
            vm = %vm.name,
            launcher = self.0.pid,
            root = self.0.parent_pid,
            "using known isolation pids"
        );
        Ok(self.0)
    }
}
