//! CLI command definitions and dispatch.

pub mod adjust;
pub mod cpuset;
pub mod mask;
pub mod overhead;
pub mod threads;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use virtres_common::config::ControllerConfig;
use virtres_common::types::{HypervisorKind, VmSpec};

/// virtres: hypervisor runtime resource controller.
#[derive(Parser, Debug)]
#[command(name = "virtres", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Node configuration and logging options.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Controller configuration file (YAML or JSON).
    #[arg(long, global = true, env = "VIRTRES_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host CPU architecture (`amd64`, `arm64`, `s390x`).
    #[arg(long, global = true, env = "VIRTRES_ARCH")]
    pub arch: Option<String>,

    /// Multiplier applied to the estimated memory overhead.
    #[arg(long, global = true, env = "VIRTRES_OVERHEAD_RATIO")]
    pub ratio: Option<String>,

    /// Hypervisor the node runs (`kvm`, `mshv`, `hyperv-layered`).
    #[arg(long, global = true, env = "VIRTRES_HYPERVISOR")]
    pub hypervisor: Option<HypervisorKind>,

    /// Mount point of the process filesystem.
    #[arg(long, global = true, env = "VIRTRES_PROC_ROOT")]
    pub proc_root: Option<PathBuf>,

    /// Mount point of the cgroup hierarchy.
    #[arg(long, global = true, env = "VIRTRES_CGROUP_ROOT")]
    pub cgroup_root: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Estimate the memory overhead of a VM.
    Overhead(overhead::OverheadArgs),
    /// Show which vCPUs a realtime mask enables.
    Mask(mask::MaskArgs),
    /// Expand and normalize a cpuset list.
    Cpuset(cpuset::CpusetArgs),
    /// List the vCPU threads of a hypervisor worker.
    Threads(threads::ThreadsArgs),
    /// Apply memlock, housekeeping, realtime and PIT adjustments to a VM.
    Adjust(adjust::AdjustArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if configuration loading or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.global)?;
    match cli.command {
        Command::Overhead(args) => overhead::execute(args, config),
        Command::Mask(args) => mask::execute(&args),
        Command::Cpuset(args) => cpuset::execute(&args),
        Command::Threads(args) => threads::execute(&args, &config),
        Command::Adjust(args) => adjust::execute(args, config),
    }
}

/// Reads a YAML or JSON document; `.json` files go through `serde_json`.
fn read_document<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    if is_json {
        serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("invalid YAML in {}", path.display()))
    }
}

/// Builds the controller configuration: file values first, then flags and
/// their environment variables.
///
/// # Errors
///
/// Returns an error if the configuration file cannot be read or parsed.
pub fn load_config(global: &GlobalArgs) -> anyhow::Result<ControllerConfig> {
    let mut config = match &global.config {
        Some(path) => read_document(path)?,
        None => ControllerConfig::default(),
    };
    if let Some(arch) = &global.arch {
        config.cpu_arch.clone_from(arch);
    }
    if let Some(ratio) = &global.ratio {
        config.additional_guest_memory_overhead_ratio = Some(ratio.clone());
    }
    if let Some(hypervisor) = global.hypervisor {
        config.hypervisor = hypervisor;
    }
    if let Some(root) = &global.proc_root {
        config.proc_root.clone_from(root);
    }
    if let Some(root) = &global.cgroup_root {
        config.cgroup_root.clone_from(root);
    }
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

/// Loads a VM spec from a YAML or JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_vm(path: &Path) -> anyhow::Result<VmSpec> {
    read_document(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "virtres",
            "overhead",
            "-f",
            "vm.yaml",
            "--arch",
            "arm64",
            "--hypervisor",
            "mshv",
            "--log-format",
            "json",
        ])
        .expect("parse");
        assert_eq!(cli.global.arch.as_deref(), Some("arm64"));
        assert_eq!(cli.global.hypervisor, Some(HypervisorKind::Mshv));
        assert_eq!(cli.global.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Command::Overhead(_)));
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("virtres.yaml");
        std::fs::write(
            &path,
            "cpuArch: s390x\nhypervisor: hyperv-layered\nadditionalGuestMemoryOverheadRatio: \"1.5\"\n",
        )
        .expect("write");

        let global = GlobalArgs {
            config: Some(path),
            arch: Some("amd64".into()),
            ..GlobalArgs::default()
        };
        let config = load_config(&global).expect("config");
        assert_eq!(config.cpu_arch, "amd64");
        assert_eq!(config.hypervisor, HypervisorKind::HypervLayered);
        assert_eq!(config.overhead_ratio(), Some("1.5"));
        assert_eq!(config.proc_root, PathBuf::from("/proc"));
    }

    #[test]
    fn json_config_and_vm_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("virtres.json");
        std::fs::write(&config_path, r#"{"procRoot": "/host/proc"}"#).expect("write");
        let vm_path = dir.path().join("vm.json");
        std::fs::write(&vm_path, r#"{"name": "j", "resources": {"requests": {"memory": "1Gi"}}}"#)
            .expect("write");

        let global = GlobalArgs {
            config: Some(config_path),
            ..GlobalArgs::default()
        };
        assert_eq!(
            load_config(&global).expect("config").proc_root,
            PathBuf::from("/host/proc")
        );
        assert_eq!(load_vm(&vm_path).expect("vm").name, "j");
    }

    #[test]
    fn missing_vm_file_names_path() {
        let err = load_vm(Path::new("/nonexistent/vm.yaml")).expect_err("missing");
        assert!(err.to_string().contains("/nonexistent/vm.yaml"));
    }
}
