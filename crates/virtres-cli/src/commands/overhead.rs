//! `virtres overhead`: Estimate the host memory a VM needs beyond guest RAM.

use std::path::PathBuf;

use clap::Args;
use virtres_common::config::ControllerConfig;
use virtres_runtime::controller::ResourceController;

use crate::output;

/// Arguments for the `overhead` command.
#[derive(Args, Debug)]
pub struct OverheadArgs {
    /// VM spec file (YAML or JSON).
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,

    /// Print the estimate term by term.
    #[arg(long, conflicts_with = "json")]
    pub explain: bool,

    /// Print the itemized estimate as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `overhead` command.
///
/// Prints the overhead in bytes, or a breakdown with `--explain`/`--json`.
///
/// # Errors
///
/// Returns an error if the VM spec cannot be loaded.
#[allow(clippy::print_stdout)]
pub fn execute(args: OverheadArgs, config: ControllerConfig) -> anyhow::Result<()> {
    let vm = super::load_vm(&args.file)?;
    let ctl = ResourceController::new(config);
    let report = ctl.overhead_report(&vm);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if args.explain {
        println!("{}", output::render_overhead(&report));
    } else {
        println!("{}", report.total.value());
    }
    Ok(())
}
