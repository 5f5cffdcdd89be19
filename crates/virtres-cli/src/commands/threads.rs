//! `virtres threads`: List the vCPU threads of a hypervisor worker.

use clap::Args;
use virtres_common::config::ControllerConfig;
use virtres_core::process::ProcFs;
use virtres_runtime::backend::HypervisorBackend;

/// Arguments for the `threads` command.
#[derive(Args, Debug)]
pub struct ThreadsArgs {
    /// Pid of the hypervisor worker process.
    pub pid: i32,
}

/// Executes the `threads` command.
///
/// Prints one `VCPU TID` row per vCPU thread, named the way the
/// configured hypervisor names them.
///
/// # Errors
///
/// Returns an error if the worker's task directory cannot be read.
#[allow(clippy::print_stdout)]
pub fn execute(args: &ThreadsArgs, config: &ControllerConfig) -> anyhow::Result<()> {
    let backend = HypervisorBackend::for_kind(config.hypervisor);
    let procfs = ProcFs::new(&config.proc_root);
    let threads = procfs
        .vcpu_threads(args.pid, backend.vcpu_marker)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    if threads.is_empty() {
        println!("No {} vCPU threads found.", backend.vcpu_marker);
        return Ok(());
    }

    println!("{:<6} {:<8}", "VCPU", "TID");
    for (vcpu, tid) in &threads {
        println!("{vcpu:<6} {tid:<8}");
    }
    Ok(())
}
