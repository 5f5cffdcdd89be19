//! Reads process and thread state from the process filesystem.
//!
//! Records are parsed by the `procfs` crate. The mount point is
//! configurable so tests can point [`ProcFs`] at a directory tree shaped
//! like `/proc`.

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use procfs::ProcError;
use procfs::process::{Process as ProcEntry, all_processes_with_root};
use virtres_common::error::{Result, VirtResError};

use super::{Process, ProcessSnapshot};

/// Handle to a mounted process filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(virtres_common::constants::DEFAULT_PROC_ROOT)
    }
}

/// Maps a `procfs` failure onto the workspace error. A vanished entry is
/// [`VirtResError::NotFound`] so callers can retry.
fn proc_error(err: ProcError, kind: &'static str, id: impl fmt::Display) -> VirtResError {
    match err {
        ProcError::NotFound(_) => VirtResError::NotFound {
            kind,
            id: id.to_string(),
        },
        ProcError::Io(source, _) if source.kind() == ErrorKind::NotFound => {
            VirtResError::NotFound {
                kind,
                id: id.to_string(),
            }
        }
        ProcError::Io(source, path) => VirtResError::Io {
            path: path.unwrap_or_default(),
            source,
        },
        ProcError::PermissionDenied(path) => VirtResError::Io {
            path: path.unwrap_or_default(),
            source: ErrorKind::PermissionDenied.into(),
        },
        other => VirtResError::parse(id.to_string(), other.to_string()),
    }
}

const fn is_vanished(err: &ProcError) -> bool {
    matches!(err, ProcError::NotFound(_))
}

/// Matches a thread command of the form `CPU <index>/<marker>`.
fn parse_vcpu_comm(comm: &str, marker: &str) -> Option<u32> {
    let (index, thread_marker) = comm.trim_end().strip_prefix("CPU ")?.split_once('/')?;
    if thread_marker != marker || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    index.parse().ok()
}

impl ProcFs {
    /// Creates a handle rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Mount point this handle reads from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry(&self, pid: i32) -> Result<ProcEntry> {
        ProcEntry::new_with_root(self.root.join(pid.to_string()))
            .map_err(|e| proc_error(e, "process", pid))
    }

    /// Takes a snapshot of every process listed under the mount point.
    ///
    /// Processes that exit while the scan runs are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount point itself cannot be listed.
    pub fn snapshot(&self) -> Result<ProcessSnapshot> {
        let entries = all_processes_with_root(&self.root)
            .map_err(|e| proc_error(e, "process table", self.root.display()))?;

        let mut processes = Vec::new();
        for entry in entries {
            match entry.and_then(|p| p.stat()) {
                Ok(stat) => processes.push(Process::new(stat.pid, stat.ppid, stat.comm)),
                Err(e) if is_vanished(&e) => {}
                Err(e) => tracing::debug!(error = %e, "skipping unreadable process"),
            }
        }
        // Directory order is unspecified; keep scans reproducible.
        processes.sort_by_key(|p| p.pid);
        tracing::debug!(count = processes.len(), "process snapshot taken");
        Ok(ProcessSnapshot::from(processes))
    }

    /// Resolves a single process or thread id.
    ///
    /// # Errors
    ///
    /// Returns [`VirtResError::NotFound`] if the id no longer exists and
    /// [`VirtResError::Parse`] if its stat record is malformed.
    pub fn process(&self, pid: i32) -> Result<Process> {
        let stat = self
            .entry(pid)?
            .stat()
            .map_err(|e| proc_error(e, "process", pid))?;
        Ok(Process::new(stat.pid, stat.ppid, stat.comm))
    }

    /// Maps vCPU index to thread id for every `CPU <n>/<marker>` thread of
    /// `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`VirtResError::NotFound`] if the process is gone.
    pub fn vcpu_threads(&self, pid: i32, marker: &str) -> Result<BTreeMap<u32, i32>> {
        let tasks = self
            .entry(pid)?
            .tasks()
            .map_err(|e| proc_error(e, "process", pid))?;

        let mut vcpus = BTreeMap::new();
        for task in tasks {
            let task = match task {
                Ok(task) => task,
                Err(e) if is_vanished(&e) => continue,
                Err(e) => return Err(proc_error(e, "thread of process", pid)),
            };
            let stat = match task.stat() {
                Ok(stat) => stat,
                Err(e) if is_vanished(&e) => continue,
                Err(e) => return Err(proc_error(e, "thread", task.tid)),
            };
            if let Some(index) = parse_vcpu_comm(&stat.comm, marker) {
                let _ = vcpus.insert(index, task.tid);
            }
        }
        tracing::debug!(pid, vcpus = vcpus.len(), "enumerated vCPU threads");
        Ok(vcpus)
    }

    /// Returns the pid of `pid` as seen from its innermost-but-one
    /// namespace: the second id of the `NSpid` status line.
    ///
    /// # Errors
    ///
    /// Returns an error if the status record is unreadable or its `NSpid`
    /// line is missing or too short.
    pub fn namespaced_pid(&self, pid: i32) -> Result<i32> {
        let status = self
            .entry(pid)?
            .status()
            .map_err(|e| proc_error(e, "process", pid))?;
        let nspid = status
            .nspid
            .ok_or_else(|| VirtResError::parse(pid.to_string(), "status has no NSpid line"))?;
        nspid.get(1).copied().ok_or_else(|| {
            VirtResError::parse(format!("{nspid:?}"), "NSpid line has no namespaced pid")
        })
    }

    /// Returns the cgroup path of `pid` for `controller`, relative to the
    /// hierarchy root. The v2 unified entry (`0::/path`) matches any
    /// controller when no v1 entry names it.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup record is unreadable or lists neither
    /// the controller nor a unified entry.
    pub fn cgroup_path(&self, pid: i32, controller: &str) -> Result<PathBuf> {
        let groups = self
            .entry(pid)?
            .cgroups()
            .map_err(|e| proc_error(e, "process", pid))?;
        let mut unified = None;
        for group in groups.0 {
            if group.controllers.iter().all(String::is_empty) {
                unified = Some(group.pathname);
            } else if group.controllers.iter().any(|c| c == controller) {
                return Ok(PathBuf::from(group.pathname));
            }
        }
        unified.map(PathBuf::from).ok_or_else(|| VirtResError::NotFound {
            kind: "cgroup",
            id: format!("{controller} for pid {pid}"),
        })
    }
}
