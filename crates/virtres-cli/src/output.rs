//! Formatted output helpers for CLI commands.
//!
//! Provides the overhead breakdown table and human-readable byte
//! formatting.

use std::fmt::Write as _;

use virtres_runtime::overhead::OverheadReport;

/// Formats a byte count into a human-readable string (e.g., "128.0 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn bytes_of(value: i64) -> String {
    u64::try_from(value).map_or_else(|_| format!("{value} B"), format_bytes)
}

/// Renders an overhead breakdown as a two-column table ending in the
/// total.
#[must_use]
pub fn render_overhead(report: &OverheadReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<20} {:>14} {:>12}", "TERM", "BYTES", "SIZE");
    for item in &report.items {
        let value = item.quantity.value();
        let _ = writeln!(out, "{:<20} {:>14} {:>12}", item.name, value, bytes_of(value));
    }
    if let Some(ratio) = report.ratio {
        let _ = writeln!(out, "{:<20} {:>14}", "(ratio applied)", format!("x{ratio}"));
    }
    let total = report.total.value();
    let _ = write!(out, "{:<20} {:>14} {:>12}", "TOTAL", total, bytes_of(total));
    out
}
