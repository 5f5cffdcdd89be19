//! Cgroup management for a VM's cgroup and its child groups.
//!
//! Supports both the v1 per-controller hierarchies (`<root>/cpuset/<path>`)
//! and the v2 unified hierarchy (`<root>/<path>`). Child groups created
//! under v2 are threaded so individual threads can be moved into them.

pub mod cpuset;

use std::fmt;
use std::path::{Path, PathBuf};

use virtres_common::constants::CPUSET_SUBSYSTEM;
use virtres_common::error::{Result, VirtResError};

use crate::process::ProcFs;

/// Operations the housekeeping step needs from a VM's cgroup.
pub trait CgroupManager {
    /// Creates child group `name` under `subsystem`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the group cannot be created or configured.
    fn create_child_cgroup(&self, name: &str, subsystem: &str) -> Result<()>;

    /// Restricts child group `child` to `cpus`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cpuset cannot be written.
    fn set_cpuset(&self, child: &str, cpus: &[u32]) -> Result<()>;

    /// Thread ids currently in the VM's own group.
    ///
    /// # Errors
    ///
    /// Returns an error if the membership file cannot be read.
    fn list_threads(&self) -> Result<Vec<i32>>;

    /// Moves thread `tid` into child group `child` of `subsystem`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be attached.
    fn attach_thread(&self, subsystem: &str, child: &str, tid: i32) -> Result<()>;
}

/// Cgroup hierarchy flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CgroupVersion {
    /// Per-controller hierarchies.
    V1,
    /// Unified hierarchy.
    V2,
}

impl CgroupVersion {
    /// Detects the hierarchy mounted at `mount_root`: v2 exposes
    /// `cgroup.controllers` at its root, v1 does not.
    #[must_use]
    pub fn detect(mount_root: &Path) -> Self {
        if mount_root.join("cgroup.controllers").exists() {
            Self::V2
        } else {
            Self::V1
        }
    }

    const fn threads_file(self) -> &'static str {
        match self {
            Self::V1 => "tasks",
            Self::V2 => "cgroup.threads",
        }
    }
}

impl fmt::Display for CgroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => f.write_str("v1"),
            Self::V2 => f.write_str("v2"),
        }
    }
}

/// [`CgroupManager`] operating directly on a mounted cgroup filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsCgroupManager {
    mount_root: PathBuf,
    relative: PathBuf,
    version: CgroupVersion,
}

impl FsCgroupManager {
    /// Creates a manager for the group at `relative` below `mount_root`.
    pub fn new(mount_root: impl Into<PathBuf>, relative: impl AsRef<Path>, version: CgroupVersion) -> Self {
        // Paths from /proc/<pid>/cgroup are absolute; joining one would
        // discard the mount root.
        let relative = relative
            .as_ref()
            .strip_prefix("/")
            .unwrap_or_else(|_| relative.as_ref())
            .to_path_buf();
        Self {
            mount_root: mount_root.into(),
            relative,
            version,
        }
    }

    /// Creates a manager for the group that `pid` lives in, detecting the
    /// hierarchy version from `mount_root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process's cgroup record cannot be read.
    pub fn for_process(procfs: &ProcFs, pid: i32, mount_root: impl Into<PathBuf>) -> Result<Self> {
        let mount_root = mount_root.into();
        let version = CgroupVersion::detect(&mount_root);
        let relative = procfs.cgroup_path(pid, CPUSET_SUBSYSTEM)?;
        tracing::debug!(pid, %version, path = %relative.display(), "resolved VM cgroup");
        Ok(Self::new(mount_root, relative, version))
    }

    /// Hierarchy flavour in use.
    #[must_use]
    pub const fn version(&self) -> CgroupVersion {
        self.version
    }

    /// Directory of the VM's own group for `subsystem`.
    #[must_use]
    pub fn group_dir(&self, subsystem: &str) -> PathBuf {
        match self.version {
            CgroupVersion::V1 => self.mount_root.join(subsystem).join(&self.relative),
            CgroupVersion::V2 => self.mount_root.join(&self.relative),
        }
    }

    fn child_dir(&self, subsystem: &str, child: &str) -> Result<PathBuf> {
        if child.is_empty() || child.contains('/') || child == "." || child == ".." {
            return Err(VirtResError::Config {
                message: format!("invalid child cgroup name {child:?}"),
            });
        }
        Ok(self.group_dir(subsystem).join(child))
    }

    fn enable_controller(&self, subsystem: &str) -> Result<()> {
        let file = self.group_dir(subsystem).join("cgroup.subtree_control");
        let enabled = cpuset::read_optional(&file)?;
        if enabled.split_whitespace().any(|c| c == subsystem) {
            return Ok(());
        }
        cpuset::write(&file, &format!("+{subsystem}"))?;
        tracing::debug!(subsystem, "controller enabled for subtree");
        Ok(())
    }
}

impl CgroupManager for FsCgroupManager {
    fn create_child_cgroup(&self, name: &str, subsystem: &str) -> Result<()> {
        let parent = self.group_dir(subsystem);
        let dir = self.child_dir(subsystem, name)?;
        std::fs::create_dir_all(&dir).map_err(|e| VirtResError::Io {
            path: dir.clone(),
            source: e,
        })?;
        match self.version {
            CgroupVersion::V1 => {
                if subsystem == CPUSET_SUBSYSTEM {
                    cpuset::inherit_mems(&parent, &dir)?;
                }
            }
            CgroupVersion::V2 => {
                self.enable_controller(subsystem)?;
                let type_file = dir.join("cgroup.type");
                if cpuset::read_optional(&type_file)?.trim() != "threaded" {
                    cpuset::write(&type_file, "threaded")?;
                }
            }
        }
        tracing::info!(path = %dir.display(), version = %self.version, "child cgroup ready");
        Ok(())
    }

    fn set_cpuset(&self, child: &str, cpus: &[u32]) -> Result<()> {
        let dir = self.child_dir(CPUSET_SUBSYSTEM, child)?;
        cpuset::set_cpus(&dir, cpus)
    }

    fn list_threads(&self) -> Result<Vec<i32>> {
        let file = self
            .group_dir(CPUSET_SUBSYSTEM)
            .join(self.version.threads_file());
        cpuset::read_threads(&file)
    }

    fn attach_thread(&self, subsystem: &str, child: &str, tid: i32) -> Result<()> {
        let file = self
            .child_dir(subsystem, child)?
            .join(self.version.threads_file());
        cpuset::write_thread(&file, tid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).expect("read")
    }

    #[test]
    fn detects_unified_hierarchy() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(CgroupVersion::detect(dir.path()), CgroupVersion::V1);
        std::fs::write(dir.path().join("cgroup.controllers"), "cpuset cpu").expect("write");
        assert_eq!(CgroupVersion::detect(dir.path()), CgroupVersion::V2);
    }

    #[test]
    fn absolute_relative_path_stays_under_mount() {
        let mgr = FsCgroupManager::new("/sys/fs/cgroup", "/kubepods/pod1", CgroupVersion::V2);
        assert_eq!(mgr.group_dir("cpuset"), PathBuf::from("/sys/fs/cgroup/kubepods/pod1"));
        let mgr = FsCgroupManager::new("/sys/fs/cgroup", "/kubepods/pod1", CgroupVersion::V1);
        assert_eq!(
            mgr.group_dir("cpuset"),
            PathBuf::from("/sys/fs/cgroup/cpuset/kubepods/pod1")
        );
    }

    #[test]
    fn v2_child_is_threaded_and_controller_enabled() {
        let root = tempfile::tempdir().expect("tempdir");
        let vm = root.path().join("pod");
        std::fs::create_dir_all(&vm).expect("mkdir");
        std::fs::write(vm.join("cgroup.threads"), "100\n101\n").expect("write");

        let mgr = FsCgroupManager::new(root.path(), "/pod", CgroupVersion::V2);
        mgr.create_child_cgroup("housekeeping", "cpuset").expect("create");
        mgr.create_child_cgroup("housekeeping", "cpuset").expect("idempotent");
        assert_eq!(read(&vm.join("housekeeping/cgroup.type")), "threaded");
        assert_eq!(read(&vm.join("cgroup.subtree_control")), "+cpuset");

        mgr.set_cpuset("housekeeping", &[5]).expect("cpuset");
        assert_eq!(read(&vm.join("housekeeping/cpuset.cpus")), "5");

        assert_eq!(mgr.list_threads().expect("threads"), vec![100, 101]);
        mgr.attach_thread("cpuset", "housekeeping", 101).expect("attach");
        assert_eq!(read(&vm.join("housekeeping/cgroup.threads")), "101");
    }

    #[test]
    fn v1_child_inherits_mems_and_uses_tasks() {
        let root = tempfile::tempdir().expect("tempdir");
        let vm = root.path().join("cpuset/pod");
        std::fs::create_dir_all(&vm).expect("mkdir");
        std::fs::write(vm.join("cpuset.mems"), "0\n").expect("write");
        std::fs::write(vm.join("tasks"), "7\n8\n").expect("write");

        let mgr = FsCgroupManager::new(root.path(), "pod", CgroupVersion::V1);
        mgr.create_child_cgroup("housekeeping", "cpuset").expect("create");
        assert_eq!(read(&vm.join("housekeeping/cpuset.mems")), "0");
        assert!(!vm.join("housekeeping/cgroup.type").exists());

        assert_eq!(mgr.list_threads().expect("threads"), vec![7, 8]);
        mgr.attach_thread("cpuset", "housekeeping", 8).expect("attach");
        assert_eq!(read(&vm.join("housekeeping/tasks")), "8");
    }

    #[test]
    fn rejects_path_like_child_names() {
        let mgr = FsCgroupManager::new("/sys/fs/cgroup", "pod", CgroupVersion::V2);
        assert!(mgr.set_cpuset("../escape", &[0]).is_err());
        assert!(mgr.attach_thread("cpuset", "", 1).is_err());
    }

    #[test]
    fn for_process_reads_proc_cgroup() {
        let proc_root = tempfile::tempdir().expect("tempdir");
        let cg_root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(proc_root.path().join("9")).expect("mkdir");
        std::fs::write(proc_root.path().join("9/cgroup"), "0::/kubepods/pod9\n").expect("write");
        std::fs::write(cg_root.path().join("cgroup.controllers"), "cpuset").expect("write");

        let mgr = FsCgroupManager::for_process(&ProcFs::new(proc_root.path()), 9, cg_root.path())
            .expect("manager");
        assert_eq!(mgr.version(), CgroupVersion::V2);
        assert_eq!(mgr.group_dir("cpuset"), cg_root.path().join("kubepods/pod9"));
    }
}
