use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{LedgerError, ResultLedger};

/// Signed money amount represented as **integer cents**.
///
/// Every stored amount (expense amount, tax, budget caps, spent totals) uses
/// this type, so arithmetic never touches floating point. On the wire it is
/// always a decimal string with exactly two fractional digits.
///
/// # Examples
///
/// ```rust
/// use ledger::MoneyCents;
///
/// let amount = MoneyCents::new(150_50);
/// assert_eq!(amount.cents(), 15050);
/// assert_eq!(amount.to_string(), "150.50");
/// assert_eq!("-0.5".parse::<MoneyCents>().unwrap().cents(), -50);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct MoneyCents(i64);

impl MoneyCents {
    pub const ZERO: MoneyCents = MoneyCents(0);

    /// Creates a new amount from integer cents.
    #[must_use]
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns the raw value in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: MoneyCents) -> Option<MoneyCents> {
        self.0.checked_add(rhs.0).map(MoneyCents)
    }

    /// Checked subtraction (returns `None` on overflow).
    #[must_use]
    pub fn checked_sub(self, rhs: MoneyCents) -> Option<MoneyCents> {
        self.0.checked_sub(rhs.0).map(MoneyCents)
    }

    /// Exact decimal value, used for ratio comparisons (warn threshold).
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }
}

impl fmt::Display for MoneyCents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&cents_to_amount(self.0))
    }
}

impl From<i64> for MoneyCents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<MoneyCents> for i64 {
    fn from(value: MoneyCents) -> Self {
        value.0
    }
}

impl Add for MoneyCents {
    type Output = MoneyCents;

    fn add(self, rhs: MoneyCents) -> Self::Output {
        MoneyCents(self.0 + rhs.0)
    }
}

impl AddAssign for MoneyCents {
    fn add_assign(&mut self, rhs: MoneyCents) {
        self.0 += rhs.0;
    }
}

impl Sub for MoneyCents {
    type Output = MoneyCents;

    fn sub(self, rhs: MoneyCents) -> Self::Output {
        MoneyCents(self.0 - rhs.0)
    }
}

impl SubAssign for MoneyCents {
    fn sub_assign(&mut self, rhs: MoneyCents) {
        self.0 -= rhs.0;
    }
}

impl Neg for MoneyCents {
    type Output = MoneyCents;

    fn neg(self) -> Self::Output {
        MoneyCents(-self.0)
    }
}

impl Sum for MoneyCents {
    fn sum<I: Iterator<Item = MoneyCents>>(iter: I) -> Self {
        iter.fold(MoneyCents::ZERO, Add::add)
    }
}

impl FromStr for MoneyCents {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        amount_to_cents(s).map(MoneyCents)
    }
}

impl Serialize for MoneyCents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MoneyCents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Caller supplied number: either an exact decimal or a string to validate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NumericInput {
    Number(Decimal),
    Text(String),
}

impl From<Decimal> for NumericInput {
    fn from(value: Decimal) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for NumericInput {
    fn from(value: i64) -> Self {
        Self::Number(Decimal::from(value))
    }
}

impl From<&str> for NumericInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for NumericInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for NumericInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericInput::Number(n) => write!(f, "{n}"),
            NumericInput::Text(s) => f.write_str(s),
        }
    }
}

/// Validates an amount and returns it in cents.
///
/// Numbers are rounded half away from zero to two decimals and may be
/// negative (positivity is the caller's rule). Strings must match
/// `^\d+(\.\d{1,2})?$` once trimmed.
pub fn parse_amount(input: &NumericInput) -> ResultLedger<MoneyCents> {
    match input {
        NumericInput::Number(value) => {
            let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            (rounded * Decimal::ONE_HUNDRED)
                .to_i64()
                .map(MoneyCents)
                .ok_or_else(|| LedgerError::InvalidAmount(format!("{value} is out of range")))
        }
        NumericInput::Text(raw) => {
            let trimmed = raw.trim();
            if !is_plain_amount(trimmed) {
                return Err(LedgerError::InvalidAmount(format!(
                    "\"{trimmed}\" is not a decimal with at most 2 fractional digits"
                )));
            }
            amount_to_cents(trimmed).map(MoneyCents)
        }
    }
}

/// Normalizes an amount to a decimal string with exactly two fractional
/// digits.
pub fn normalize_amount(input: impl Into<NumericInput>) -> ResultLedger<String> {
    parse_amount(&input.into()).map(|cents| cents.to_string())
}

/// Converts a decimal string into integer cents.
///
/// Accepts an optional leading sign. Rejects more than two fractional
/// digits and values that do not fit into `i64` cents.
pub fn amount_to_cents(s: &str) -> ResultLedger<i64> {
    let invalid = || LedgerError::InvalidAmount(format!("\"{s}\" is not a valid amount"));
    let overflow = || LedgerError::InvalidAmount(format!("\"{s}\" is too large"));

    let trimmed = s.trim();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(stripped) => (true, stripped),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (units_str, frac_str) = match rest.split_once('.') {
        Some((units, frac)) => (units, Some(frac)),
        None => (rest, None),
    };

    if units_str.is_empty() || !units_str.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let units: i64 = units_str.parse().map_err(|_| overflow())?;

    let frac: i64 = match frac_str {
        None => 0,
        Some(frac) => {
            if !frac.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            match frac.len() {
                1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
                2 => frac.parse::<i64>().map_err(|_| invalid())?,
                _ => return Err(invalid()),
            }
        }
    };

    let total = units
        .checked_mul(100)
        .and_then(|v| v.checked_add(frac))
        .ok_or_else(overflow)?;

    if negative {
        total.checked_neg().ok_or_else(overflow)
    } else {
        Ok(total)
    }
}

/// Formats integer cents as a decimal string with two fractional digits.
#[must_use]
pub fn cents_to_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

fn is_plain_amount(s: &str) -> bool {
    let (units, frac) = match s.split_once('.') {
        Some((units, frac)) => (units, Some(frac)),
        None => (s, None),
    };
    let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    !units.is_empty()
        && digits(units)
        && frac.is_none_or(|frac| (1..=2).contains(&frac.len()) && digits(frac))
}
