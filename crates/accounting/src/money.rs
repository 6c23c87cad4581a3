//! Exact fixed-point monetary amounts.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use keel_core::{DomainError, ValueObject};

/// Number of fractional digits kept by [`Money`].
pub const SCALE: u32 = 2;

const MINOR_PER_MAJOR: i64 = 10_i64.pow(SCALE);

/// Signed monetary amount, stored as a count of minor units (e.g. cents).
///
/// Arithmetic is exact and checked: there are no operator impls, so an
/// overflow is always an error rather than a panic. Amounts with more
/// fractional digits than [`SCALE`] are rejected rather than rounded.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor_units: i64) -> Self {
        Self(minor_units)
    }

    /// Whole units, e.g. `Money::from_major(10)` is `10.00`.
    pub fn from_major(units: i64) -> Result<Self, DomainError> {
        units
            .checked_mul(MINOR_PER_MAJOR)
            .map(Self)
            .ok_or_else(|| DomainError::validation("amount out of range"))
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Result<Money, DomainError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or_else(|| DomainError::validation("amount out of range"))
    }

    pub fn checked_neg(self) -> Result<Money, DomainError> {
        self.0
            .checked_neg()
            .map(Self)
            .ok_or_else(|| DomainError::validation("amount out of range"))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let unit = MINOR_PER_MAJOR as u64;
        write!(
            f,
            "{sign}{}.{:0width$}",
            abs / unit,
            abs % unit,
            width = SCALE as usize
        )
    }
}

impl FromStr for Money {
    type Err = DomainError;

    /// Parses `10`, `-15.00`, `+0.5`, `.25`. Accepts every value [`Display`]
    /// produces, down to `Money::from_minor(i64::MIN)`.
    ///
    /// [`Display`]: core::fmt::Display
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| DomainError::validation(format!("money `{s}`: {reason}"));

        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("no digits"));
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid("not a decimal number"));
        }
        if fraction.len() > SCALE as usize {
            return Err(invalid("too many fractional digits"));
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("out of range"))?
        };
        let padded = format!("{fraction:0<width$}", width = SCALE as usize);
        let fraction: u64 = padded.parse().map_err(|_| invalid("out of range"))?;

        // Magnitude in i128 so that |i64::MIN| still fits before the sign is applied.
        let magnitude = i128::from(whole) * i128::from(MINOR_PER_MAJOR) + i128::from(fraction);
        let signed = if negative { -magnitude } else { magnitude };

        i64::try_from(signed)
            .map(Self)
            .map_err(|_| invalid("out of range"))
    }
}
