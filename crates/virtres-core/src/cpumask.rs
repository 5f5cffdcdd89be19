//! Realtime vCPU mask parsing.
//!
//! A mask is a comma-separated list of `N-M` ranges, single ids `N`, and
//! negations `^N`, applied left to right. An empty mask selects every
//! vCPU; a non-empty mask is a whitelist.

use std::collections::BTreeMap;
use std::str::FromStr;

use nom::{
    IResult, Parser,
    branch::alt,
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt, recognize},
    sequence::{preceded, separated_pair},
};
use virtres_common::error::{Result, VirtResError};

/// Highest vCPU index a mask may name.
///
/// Matches the largest guest vCPU count KVM accepts (`KVM_MAX_VCPUS` on
/// x86). A larger index cannot refer to a real vCPU and ranges past it
/// would otherwise expand without bound.
pub const MAX_VCPU_INDEX: u32 = 4095;

/// State recorded for a vCPU id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcpuState {
    /// Selected for realtime scheduling.
    Enabled,
    /// Explicitly excluded with `^N`.
    Disabled,
}

/// Parsed vCPU mask.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuMask {
    states: BTreeMap<u32, VcpuState>,
}

#[derive(Debug, Clone, Copy)]
enum Directive {
    Range(i64, i64),
    Single(i64),
    Negate(i64),
}

fn index(input: &str) -> IResult<&str, i64> {
    map_res(recognize((opt(char('-')), digit1)), str::parse::<i64>).parse(input)
}

fn directive(input: &str) -> IResult<&str, Directive> {
    all_consuming(alt((
        map(preceded(char('^'), index), Directive::Negate),
        map(separated_pair(index, char('-'), index), |(start, end)| {
            Directive::Range(start, end)
        }),
        map(index, Directive::Single),
    )))
    .parse(input)
}

fn checked_id(token: &str, id: i64) -> Result<u32> {
    if id < 0 {
        return Err(VirtResError::parse(token, "negative vCPU index"));
    }
    u32::try_from(id)
        .ok()
        .filter(|&id| id <= MAX_VCPU_INDEX)
        .ok_or_else(|| {
            VirtResError::parse(token, format!("vCPU index above {MAX_VCPU_INDEX}"))
        })
}

impl CpuMask {
    /// Parses a mask string.
    ///
    /// # Errors
    ///
    /// Returns [`VirtResError::Parse`] naming the first token that is not a
    /// range, single id or negation, holds a negative or out-of-range
    /// index, or describes a range whose start exceeds its end.
    pub fn parse(input: &str) -> Result<Self> {
        let mut mask = Self::default();
        if input.trim().is_empty() {
            return Ok(mask);
        }

        for raw in input.split(',') {
            let token = raw.trim();
            let (_, parsed) = directive(token)
                .map_err(|_| VirtResError::parse(token, "invalid mask token"))?;
            match parsed {
                Directive::Range(start, end) => {
                    let (start, end) = (checked_id(token, start)?, checked_id(token, end)?);
                    if start > end {
                        return Err(VirtResError::parse(token, "range start is greater than end"));
                    }
                    for id in start..=end {
                        mask.enable(id);
                    }
                }
                Directive::Single(id) => mask.enable(checked_id(token, id)?),
                Directive::Negate(id) => {
                    let _ = mask.states.insert(checked_id(token, id)?, VcpuState::Disabled);
                }
            }
        }
        Ok(mask)
    }

    /// Positive directives never override an id that is already recorded.
    fn enable(&mut self, id: u32) {
        let _ = self.states.entry(id).or_insert(VcpuState::Enabled);
    }

    /// Returns whether the vCPU is selected.
    #[must_use]
    pub fn is_enabled(&self, vcpu: u32) -> bool {
        if self.states.is_empty() {
            return true;
        }
        self.states.get(&vcpu) == Some(&VcpuState::Enabled)
    }

    /// Returns `true` for the universal mask.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Returns the recorded state of a vCPU, if any directive named it.
    #[must_use]
    pub fn state(&self, vcpu: u32) -> Option<VcpuState> {
        self.states.get(&vcpu).copied()
    }

    /// Ids explicitly enabled, in ascending order.
    #[must_use]
    pub fn enabled_ids(&self) -> Vec<u32> {
        self.states
            .iter()
            .filter(|(_, state)| **state == VcpuState::Enabled)
            .map(|(id, _)| *id)
            .collect()
    }
}

impl FromStr for CpuMask {
    type Err = VirtResError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
