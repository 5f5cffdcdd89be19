//! Linux cpuset list format (`0-3,8,10-11`).
//!
//! Used for the emulator-pin CPU set of a rendered domain and for the
//! `cpuset.cpus` control file. Expansion is bounded by
//! [`MAX_CPUSET_ENTRIES`] so a hostile range cannot allocate unbounded
//! memory.

use std::collections::BTreeSet;

use nom::{
    IResult, Parser,
    character::complete::{char, digit1},
    combinator::{all_consuming, map_res, opt},
    sequence::preceded,
};
use virtres_common::constants::MAX_CPUSET_ENTRIES;
use virtres_common::error::{Result, VirtResError};

fn cpu_id(input: &str) -> IResult<&str, u64> {
    map_res(digit1, str::parse::<u64>).parse(input)
}

fn entry(input: &str) -> IResult<&str, (u64, Option<u64>)> {
    all_consuming((cpu_id, opt(preceded(char('-'), cpu_id)))).parse(input)
}

/// Expands a cpuset list into sorted, de-duplicated CPU ids.
///
/// # Errors
///
/// Returns [`VirtResError::Parse`] for malformed entries, inverted ranges,
/// ids that do not fit a `u32`, or lists expanding past
/// [`MAX_CPUSET_ENTRIES`] ids.
pub fn parse_cpuset(input: &str) -> Result<Vec<u32>> {
    let mut cpus = BTreeSet::new();
    let mut expanded: u64 = 0;
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    for raw in input.split(',') {
        let token = raw.trim();
        let (_, (start, end)) =
            entry(token).map_err(|_| VirtResError::parse(token, "invalid cpuset entry"))?;
        let end = end.unwrap_or(start);
        if start > end {
            return Err(VirtResError::parse(token, "range start is greater than end"));
        }

        expanded = expanded.saturating_add(end - start + 1);
        if expanded > MAX_CPUSET_ENTRIES as u64 {
            return Err(VirtResError::parse(
                input,
                format!("cpuset expands past {MAX_CPUSET_ENTRIES} entries"),
            ));
        }

        for cpu in start..=end {
            let cpu = u32::try_from(cpu)
                .map_err(|_| VirtResError::parse(token, "cpu id out of range"))?;
            let _ = cpus.insert(cpu);
        }
    }
    Ok(cpus.into_iter().collect())
}

/// Renders CPU ids in the compact list form, collapsing runs into ranges.
#[must_use]
pub fn format_cpuset(cpus: &[u32]) -> String {
    let sorted: BTreeSet<u32> = cpus.iter().copied().collect();
    let mut parts = Vec::new();
    let mut iter = sorted.into_iter().peekable();

    while let Some(start) = iter.next() {
        let mut end = start;
        while let Some(next) = iter.next_if(|&cpu| Some(cpu) == end.checked_add(1)) {
            end = next;
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}-{end}"));
        }
    }
    parts.join(",")
}
