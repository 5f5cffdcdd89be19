//! Control-file access for the cpuset controller.
//!
//! Manages `cpuset.cpus`, `cpuset.mems` and the thread membership files
//! (`cgroup.threads` on v2, `tasks` on v1).

use std::io::ErrorKind;
use std::path::Path;

use virtres_common::error::{Result, VirtResError};

use crate::cpuset::format_cpuset;

fn io_err(path: &Path, source: std::io::Error) -> VirtResError {
    VirtResError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads a control file, treating a missing file as empty.
pub(crate) fn read_optional(file: &Path) -> Result<String> {
    match std::fs::read_to_string(file) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(io_err(file, e)),
    }
}

pub(crate) fn write(file: &Path, value: &str) -> Result<()> {
    std::fs::write(file, value).map_err(|e| io_err(file, e))
}

/// Writes the allowed CPU list to `cpuset.cpus`.
///
/// # Errors
///
/// Returns an error if `cpus` is empty or the write fails.
pub fn set_cpus(cgroup_path: &Path, cpus: &[u32]) -> Result<()> {
    if cpus.is_empty() {
        return Err(VirtResError::Config {
            message: format!("empty cpuset for {}", cgroup_path.display()),
        });
    }
    let file = cgroup_path.join("cpuset.cpus");
    let value = format_cpuset(cpus);
    write(&file, &value)?;
    tracing::debug!(cpus = %value, path = %cgroup_path.display(), "cpuset.cpus set");
    Ok(())
}

/// Copies `cpuset.mems` from `parent` into `child` unless the child
/// already has memory nodes. v1 refuses task attachment to a cpuset with
/// no memory nodes.
///
/// # Errors
///
/// Returns an error if either file cannot be accessed.
pub fn inherit_mems(parent: &Path, child: &Path) -> Result<()> {
    let child_file = child.join("cpuset.mems");
    if !read_optional(&child_file)?.trim().is_empty() {
        return Ok(());
    }
    let mems = read_optional(&parent.join("cpuset.mems"))?;
    let mems = mems.trim();
    if mems.is_empty() {
        return Ok(());
    }
    write(&child_file, mems)?;
    tracing::debug!(mems, path = %child.display(), "cpuset.mems inherited");
    Ok(())
}

/// Parses a membership file: one thread id per line.
///
/// # Errors
///
/// Returns an error if the file is unreadable or a line is not an id.
pub fn read_threads(file: &Path) -> Result<Vec<i32>> {
    let content = read_optional(file)?;
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            l.parse::<i32>()
                .map_err(|e| VirtResError::parse(l, format!("thread id: {e}")))
        })
        .collect()
}

/// Moves `tid` into the cgroup owning `file`.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn write_thread(file: &Path, tid: i32) -> Result<()> {
    write(file, &tid.to_string())?;
    tracing::debug!(tid, file = %file.display(), "thread attached");
    Ok(())
}
