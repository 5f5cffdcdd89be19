//! Process-table snapshots and hypervisor process lookup.
//!
//! A [`ProcessSnapshot`] is a point-in-time copy of the host process table.
//! Processes may exit between the snapshot and its use, so lookups that
//! come back empty mean "retry later" rather than "broken VM".

pub mod procfs;

use virtres_common::constants::PREFORK_MANAGER_NAME;
use virtres_common::error::{Result, VirtResError};

pub use self::procfs::ProcFs;

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Process {
    /// Host-visible process id.
    pub pid: i32,
    /// Host-visible parent process id.
    pub parent_pid: i32,
    /// Command name as reported by the kernel.
    pub executable: String,
}

impl Process {
    /// Creates a process row.
    pub fn new(pid: i32, parent_pid: i32, executable: impl Into<String>) -> Self {
        Self {
            pid,
            parent_pid,
            executable: executable.into(),
        }
    }
}

/// Point-in-time copy of the process table, in scan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    processes: Vec<Process>,
}

impl From<Vec<Process>> for ProcessSnapshot {
    fn from(processes: Vec<Process>) -> Self {
        Self { processes }
    }
}

impl ProcessSnapshot {
    /// All rows in scan order.
    #[must_use]
    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    /// Processes whose parent is `parent_pid`.
    #[must_use]
    pub fn children_of(&self, parent_pid: i32) -> Vec<&Process> {
        self.processes
            .iter()
            .filter(|p| p.parent_pid == parent_pid)
            .collect()
    }

    /// The hypervisor worker: the first child of the isolated root whose
    /// executable matches one of `prefixes`, tried in order.
    ///
    /// # Errors
    ///
    /// Returns [`VirtResError::NotFound`] when no child matches.
    pub fn find_hypervisor_worker(
        &self,
        isolated_root_pid: i32,
        prefixes: &[&str],
    ) -> Result<&Process> {
        find_by_executable_prefix(&self.children_of(isolated_root_pid), prefixes)
    }

    /// The pre-fork manager spawned by the launcher, if it is up yet.
    #[must_use]
    pub fn find_prefork_manager(&self, launcher_pid: i32) -> Option<&Process> {
        self.children_of(launcher_pid)
            .into_iter()
            .find(|p| p.executable == PREFORK_MANAGER_NAME)
    }

    /// First process whose executable is exactly `name`.
    #[must_use]
    pub fn find_by_exact_name(&self, name: &str) -> Option<&Process> {
        self.processes.iter().find(|p| p.executable == name)
    }
}

/// Searches `processes` prefix by prefix and returns the first match.
///
/// Earlier prefixes win over later ones regardless of where the matching
/// processes sit in `processes`.
///
/// # Errors
///
/// Returns [`VirtResError::NotFound`] when no prefix matches any process.
pub fn find_by_executable_prefix<'a>(
    processes: &[&'a Process],
    prefixes: &[&str],
) -> Result<&'a Process> {
    prefixes
        .iter()
        .find_map(|prefix| {
            processes
                .iter()
                .copied()
                .find(|p| p.executable.starts_with(prefix))
        })
        .ok_or_else(|| VirtResError::NotFound {
            kind: "hypervisor process",
            id: prefixes.join("|"),
        })
}
