//! Fixed-point monetary amounts.
//!
//! All amounts are held as integer minor units (cents). Decimal strings from
//! the remote API are converted at the boundary; no floating point enters
//! storage or aggregation, so sums over large order histories do not drift.

use std::{fmt, iter::Sum, ops::Add};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A monetary amount in minor units (two decimal places assumed).
///
/// The currency code is carried separately on the owning record.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
  pub const ZERO: Money = Money(0);

  pub const fn from_minor(minor: i64) -> Self { Money(minor) }

  pub const fn minor_units(self) -> i64 { self.0 }

  /// Lossy conversion to major units, for scoring normalisation only.
  pub fn to_major_lossy(self) -> f64 { self.0 as f64 / 100.0 }

  /// Parse a decimal string such as `"12.34"`, `"7"` or `"-3.5"`.
  ///
  /// At most two fractional digits are accepted; the remote API never sends
  /// more, so anything longer is treated as a malformed payload.
  pub fn parse_decimal(s: &str) -> Result<Self> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
      Some(rest) => (true, rest),
      None => (false, s),
    };

    let (whole, frac) = match digits.split_once('.') {
      Some((w, f)) => (w, f),
      None => (digits, ""),
    };

    if whole.is_empty() && frac.is_empty() {
      return Err(Error::InvalidAmount(s.to_owned()));
    }
    if frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
      return Err(Error::InvalidAmount(s.to_owned()));
    }
    if !whole.is_empty() && !whole.chars().all(|c| c.is_ascii_digit()) {
      return Err(Error::InvalidAmount(s.to_owned()));
    }

    let whole_val: i64 = if whole.is_empty() {
      0
    } else {
      whole.parse().map_err(|_| Error::InvalidAmount(s.to_owned()))?
    };

    let frac_val: i64 = match frac.len() {
      0 => 0,
      1 => frac.parse::<i64>().map_err(|_| Error::InvalidAmount(s.to_owned()))? * 10,
      _ => frac.parse().map_err(|_| Error::InvalidAmount(s.to_owned()))?,
    };

    let minor = whole_val
      .checked_mul(100)
      .and_then(|w| w.checked_add(frac_val))
      .ok_or_else(|| Error::InvalidAmount(s.to_owned()))?;

    Ok(Money(if negative { -minor } else { minor }))
  }

  /// Multiply by a quantity (line revenue = unit price × quantity).
  pub fn times(self, quantity: u32) -> Money {
    Money(self.0.saturating_mul(i64::from(quantity)))
  }
}

impl Add for Money {
  type Output = Money;
  fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Sum for Money {
  fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
    iter.fold(Money::ZERO, Add::add)
  }
}

impl fmt::Display for Money {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sign = if self.0 < 0 { "-" } else { "" };
    let abs = self.0.unsigned_abs();
    write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
  }
}
