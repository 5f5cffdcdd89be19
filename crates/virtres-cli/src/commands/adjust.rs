//! `virtres adjust`: Apply runtime resource adjustments to a running VM's
//! processes.

use std::path::PathBuf;

use clap::Args;
use virtres_common::config::ControllerConfig;
use virtres_common::types::{IsolationResult, RenderedDomain};
use virtres_core::cgroup::{CgroupVersion, FsCgroupManager};
use virtres_runtime::controller::ResourceController;
use virtres_runtime::isolation::KnownIsolation;

/// Arguments for the `adjust` command.
#[derive(Args, Debug)]
pub struct AdjustArgs {
    /// VM spec file (YAML or JSON).
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,

    /// Pid of the VM's launcher process.
    #[arg(long)]
    pub launcher_pid: i32,

    /// Pid of the root of the VM's isolated process tree.
    #[arg(long)]
    pub root_pid: i32,

    /// VM cgroup relative to the cgroup root. Read from the launcher's
    /// cgroup record when omitted.
    #[arg(long)]
    pub cgroup: Option<PathBuf>,

    /// CPUs the rendered domain reserves for the emulator thread.
    #[arg(long)]
    pub emulator_pin: Option<String>,
}

/// Executes the `adjust` command.
///
/// Raises the memlock limit when needed, then runs the housekeeping,
/// realtime and PIT steps.
///
/// # Errors
///
/// Returns an error if the VM spec cannot be loaded or any step fails.
pub fn execute(args: AdjustArgs, config: ControllerConfig) -> anyhow::Result<()> {
    let vm = super::load_vm(&args.file)?;
    let isolation = IsolationResult {
        pid: args.launcher_pid,
        parent_pid: args.root_pid,
    };
    let detector = KnownIsolation(isolation);
    let ctl = ResourceController::new(config);

    ctl.adjust_resources(&vm, &detector)
        .map_err(|e| anyhow::anyhow!("memlock adjustment failed: {e}"))?;

    let cgroups = match args.cgroup {
        Some(dir) => {
            let root = &ctl.config().cgroup_root;
            FsCgroupManager::new(root, dir, CgroupVersion::detect(root))
        }
        None => ctl
            .cgroup_manager(&isolation)
            .map_err(|e| anyhow::anyhow!("{e}"))?,
    };
    let domain = RenderedDomain {
        emulator_pin: args.emulator_pin,
    };
    ctl.handle_housekeeping(&vm, &detector, &cgroups, Some(&domain))
        .map_err(|e| anyhow::anyhow!("thread adjustment failed: {e}"))?;

    tracing::info!(vm = %vm.name, "resource adjustments applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_vm_touches_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = dir.path().join("vm.yaml");
        std::fs::write(&spec, "name: plain\n").expect("write");
        let config = ControllerConfig {
            proc_root: dir.path().join("proc"),
            cgroup_root: dir.path().join("cgroup"),
            ..ControllerConfig::default()
        };
        let args = AdjustArgs {
            file: spec,
            launcher_pid: 10,
            root_pid: 20,
            cgroup: Some("pod".into()),
            emulator_pin: None,
        };
        execute(args, config).expect("adjust");
        assert!(!dir.path().join("cgroup").exists());
    }

    #[test]
    fn housekeeping_cgroup_created_under_given_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = dir.path().join("vm.yaml");
        std::fs::write(
            &spec,
            "name: hk\ncpu:\n  dedicatedCpuPlacement: true\n  isolateEmulatorThread: true\nphase: Running\n",
        )
        .expect("write");
        let cgroup_root = dir.path().join("cgroup");
        std::fs::create_dir_all(cgroup_root.join("pod")).expect("mkdir");
        std::fs::write(cgroup_root.join("cgroup.controllers"), "cpuset").expect("write");
        let config = ControllerConfig {
            proc_root: dir.path().join("proc"),
            cgroup_root: cgroup_root.clone(),
            ..ControllerConfig::default()
        };
        let args = AdjustArgs {
            file: spec,
            launcher_pid: 10,
            root_pid: 20,
            cgroup: Some("pod".into()),
            emulator_pin: None,
        };
        execute(args, config).expect("adjust");
        assert!(cgroup_root.join("pod/housekeeping").is_dir());
    }
}
