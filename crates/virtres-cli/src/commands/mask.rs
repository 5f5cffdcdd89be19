//! `virtres mask`: Show which vCPUs a realtime mask selects.

use clap::Args;
use virtres_core::cpumask::{CpuMask, VcpuState};

/// Arguments for the `mask` command.
#[derive(Args, Debug)]
pub struct MaskArgs {
    /// Mask expression, e.g. `0-3,^1`. Empty selects every vCPU.
    #[arg(default_value = "")]
    pub mask: String,

    /// Print the state of vCPUs `0..N` instead of the explicit ids.
    #[arg(long)]
    pub vcpus: Option<u32>,
}

/// Renders one line per vCPU in `0..count`.
fn describe(mask: &CpuMask, count: u32) -> Vec<String> {
    (0..count)
        .map(|vcpu| {
            let state = match mask.state(vcpu) {
                Some(VcpuState::Disabled) => "disabled",
                _ if mask.is_enabled(vcpu) => "enabled",
                _ => "-",
            };
            format!("{vcpu:<6} {state}")
        })
        .collect()
}

/// Executes the `mask` command.
///
/// # Errors
///
/// Returns an error if the mask does not parse.
#[allow(clippy::print_stdout)]
pub fn execute(args: &MaskArgs) -> anyhow::Result<()> {
    let mask = CpuMask::parse(&args.mask).map_err(|e| anyhow::anyhow!("{e}"))?;

    if let Some(count) = args.vcpus {
        println!("{:<6} STATE", "VCPU");
        for line in describe(&mask, count) {
            println!("{line}");
        }
    } else if mask.is_empty() {
        println!("all");
    } else {
        let ids: Vec<_> = mask.enabled_ids().iter().map(u32::to_string).collect();
        println!("{}", ids.join(","));
    }
    Ok(())
}
