//! Resource quantities in the Kubernetes textual notation.
//!
//! A [`Quantity`] holds an exact amount in milli-units so CPU values such as
//! `500m` and memory values such as `1.5Gi` share one representation. The
//! memory overhead accumulator works in whole kilo units on top of it.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, opt},
    sequence::preceded,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, VirtResError};

const MILLIS_PER_UNIT: i128 = 1_000;
const MILLIS_PER_KILO: i128 = 1_000_000;
const KI: i128 = 1 << 10;
const MI: i128 = 1 << 20;
const GI: i128 = 1 << 30;

/// An exact resource amount (bytes for memory, cores for CPU).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity {
    millis: i128,
}

impl Quantity {
    /// The zero quantity.
    pub const ZERO: Self = Self { millis: 0 };

    /// Creates a quantity from a raw milli-unit amount.
    #[must_use]
    pub const fn from_millis(millis: i128) -> Self {
        Self { millis }
    }

    /// Creates a quantity of whole units (bytes or cores).
    #[must_use]
    pub const fn from_value(value: i64) -> Self {
        Self {
            millis: value as i128 * MILLIS_PER_UNIT,
        }
    }

    /// Creates a quantity of whole kilo units (1000 bytes).
    #[must_use]
    pub const fn from_scaled_kilo(kilo: i64) -> Self {
        Self {
            millis: kilo as i128 * MILLIS_PER_KILO,
        }
    }

    /// Creates a quantity of `n` mebibytes.
    #[must_use]
    pub const fn mebibytes(n: u32) -> Self {
        Self {
            millis: n as i128 * MI * MILLIS_PER_UNIT,
        }
    }

    /// Creates a quantity of `n` gibibytes.
    #[must_use]
    pub const fn gibibytes(n: u32) -> Self {
        Self {
            millis: n as i128 * GI * MILLIS_PER_UNIT,
        }
    }

    /// Returns the exact amount in milli-units.
    #[must_use]
    pub const fn millis(&self) -> i128 {
        self.millis
    }

    /// Returns the amount in whole units, rounded up.
    #[must_use]
    pub fn value(&self) -> i64 {
        saturate(ceil_div(self.millis, MILLIS_PER_UNIT))
    }

    /// Returns the amount in whole kilo units, rounded up.
    #[must_use]
    pub fn scaled_kilo(&self) -> i64 {
        saturate(ceil_div(self.millis, MILLIS_PER_KILO))
    }

    /// Returns `true` for a zero amount.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.millis == 0
    }

    /// Multiplies the quantity by an integer factor, saturating at the
    /// bounds of the milli-unit range.
    #[must_use]
    pub const fn times(self, factor: i64) -> Self {
        Self {
            millis: self.millis.saturating_mul(factor as i128),
        }
    }
}

const fn ceil_div(n: i128, d: i128) -> i128 {
    let q = n / d;
    if n % d != 0 && n > 0 { q + 1 } else { q }
}

fn saturate(v: i128) -> i64 {
    i64::try_from(v).unwrap_or(if v < 0 { i64::MIN } else { i64::MAX })
}

/// Addition saturates; parsed quantities can sit at the edge of the range.
impl Add for Quantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            millis: self.millis.saturating_add(rhs.millis),
        }
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Self) {
        self.millis = self.millis.saturating_add(rhs.millis);
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// Splits a quantity into sign, integer digits, fraction digits and suffix.
fn quantity_parts(input: &str) -> IResult<&str, (Option<char>, &str, Option<&str>, Option<&str>)> {
    all_consuming((
        opt(one_of("+-")),
        digit1,
        opt(preceded(char('.'), digit1)),
        opt(suffix),
    ))
    .parse(input)
}

/// Binary suffixes are tried before the decimal ones they start with.
fn suffix(input: &str) -> IResult<&str, &str> {
    alt((
        tag("Ki"),
        tag("Mi"),
        tag("Gi"),
        tag("Ti"),
        tag("Pi"),
        tag("Ei"),
        tag("m"),
        tag("k"),
        tag("M"),
        tag("G"),
        tag("T"),
        tag("P"),
        tag("E"),
    ))
    .parse(input)
}

/// Milli-units represented by one unit of the given suffix.
fn suffix_millis(suffix: Option<&str>) -> i128 {
    let multiplier: i128 = match suffix {
        Some("m") => return 1,
        Some("k") => 1_000,
        Some("M") => 1_000_000,
        Some("G") => 1_000_000_000,
        Some("T") => 1_000_000_000_000,
        Some("P") => 1_000_000_000_000_000,
        Some("E") => 1_000_000_000_000_000_000,
        Some("Ki") => KI,
        Some("Mi") => MI,
        Some("Gi") => GI,
        Some("Ti") => GI * KI,
        Some("Pi") => GI * MI,
        Some("Ei") => GI * GI,
        _ => 1,
    };
    multiplier * MILLIS_PER_UNIT
}

impl FromStr for Quantity {
    type Err = VirtResError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (_, (sign, int, frac, suffix)) = quantity_parts(trimmed)
            .map_err(|_| VirtResError::parse(s, "not a resource quantity"))?;

        let frac = frac.unwrap_or("");
        let mantissa: i128 = format!("{int}{frac}")
            .parse()
            .map_err(|_| VirtResError::parse(s, "quantity out of range"))?;
        let scale = u32::try_from(frac.len())
            .ok()
            .and_then(|digits| 10_i128.checked_pow(digits))
            .ok_or_else(|| VirtResError::parse(s, "too many fractional digits"))?;
        let numerator = mantissa
            .checked_mul(suffix_millis(suffix))
            .ok_or_else(|| VirtResError::parse(s, "quantity out of range"))?;

        let millis = ceil_div(numerator, scale);
        Ok(Self {
            millis: if sign == Some('-') { -millis } else { millis },
        })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.millis % MILLIS_PER_UNIT != 0 {
            return write!(f, "{}m", self.millis);
        }
        let units = self.millis / MILLIS_PER_UNIT;
        if units == 0 {
            return write!(f, "0");
        }
        for (size, name) in [(GI, "Gi"), (MI, "Mi"), (KI, "Ki")] {
            if units % size == 0 {
                return write!(f, "{}{name}", units / size);
            }
        }
        write!(f, "{units}")
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuantity {
    Text(String),
    Int(i64),
    Float(f64),
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match RawQuantity::deserialize(deserializer)? {
            RawQuantity::Text(s) => s.parse().map_err(serde::de::Error::custom),
            RawQuantity::Int(v) => Ok(Self::from_value(v)),
            RawQuantity::Float(v) => v.to_string().parse().map_err(serde::de::Error::custom),
        }
    }
}
