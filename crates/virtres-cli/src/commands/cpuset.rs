//! `virtres cpuset`: Expand and normalize a cpuset list.

use clap::Args;
use virtres_core::cpuset::{format_cpuset, parse_cpuset};

/// Arguments for the `cpuset` command.
#[derive(Args, Debug)]
pub struct CpusetArgs {
    /// Cpuset list, e.g. `0-3,8`.
    pub list: String,

    /// Print every CPU id instead of the compact form.
    #[arg(long)]
    pub expand: bool,
}

/// Executes the `cpuset` command.
///
/// # Errors
///
/// Returns an error if the list does not parse.
#[allow(clippy::print_stdout)]
pub fn execute(args: &CpusetArgs) -> anyhow::Result<()> {
    let cpus = parse_cpuset(&args.list).map_err(|e| anyhow::anyhow!("{e}"))?;
    if args.expand {
        let ids: Vec<_> = cpus.iter().map(u32::to_string).collect();
        println!("{}", ids.join(" "));
    } else {
        println!("{}", format_cpuset(&cpus));
    }
    Ok(())
}
