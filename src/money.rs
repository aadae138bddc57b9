use anyhow::{Context, Error, Result};
use num_traits::Zero;
use rust_decimal::prelude::*;
use std::convert::TryFrom;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use std::str::FromStr;

/// Currency suffix used when displaying amounts.
pub const CURRENCY: &str = "đ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Money(pub Decimal);

impl Money {
    /// Rounds to whole currency units, as stored in the ledger.
    pub fn round_units(&self) -> i64 {
        self.0.round().to_i64().unwrap_or(0)
    }
}

impl From<i64> for Money {
    fn from(units: i64) -> Self {
        Self(Decimal::from(units))
    }
}

impl TryFrom<f64> for Money {
    type Error = Error;

    fn try_from(f: f64) -> Result<Self> {
        let d = Decimal::from_f64(f).context(format!("Failed to convert {} to Money", f))?;
        Ok(Self(d.normalize()))
    }
}

/// Accepts `1500000`, `1.500.000`, `1,500,000` and `12500.5`.
///
/// A lone `.` or `,` followed by exactly three digits is read as a thousands
/// separator, otherwise as the decimal point.
impl FromStr for Money {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_end_matches(CURRENCY).trim();
        if trimmed.is_empty() {
            anyhow::bail!("Empty amount");
        }
        let separators = trimmed.matches(['.', ',']).count();
        let tail = trimmed.rsplit(['.', ',']).next().unwrap_or_default();
        let normalized: String = if separators > 1 || (separators == 1 && tail.len() == 3) {
            trimmed
                .chars()
                .filter(|c| !matches!(c, '.' | ',' | ' '))
                .collect()
        } else {
            trimmed.replace(',', ".").replace(' ', "")
        };
        let d = Decimal::from_str(&normalized)
            .with_context(|| format!("Failed to parse amount: '{}'", s))?;
        Ok(Self(d))
    }
}

/// Groups the integer part by thousands with `.` as is usual for đồng.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = self.0.abs().normalize();
        let text = abs.to_string();
        let (int_part, frac_part) = match text.split_once('.') {
            Some((int_part, frac_part)) => (int_part, Some(frac_part)),
            None => (text.as_str(), None),
        };
        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        for (i, c) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }
        if let Some(frac_part) = frac_part {
            grouped.push(',');
            grouped.push_str(frac_part);
        }
        if self.0.is_sign_negative() && !self.0.is_zero() {
            write!(f, "-{} {}", grouped, CURRENCY)
        } else {
            write!(f, "{} {}", grouped, CURRENCY)
        }
    }
}

impl<'a, 'b> Add<&'b Money> for &'a Money {
    type Output = Money;

    fn add(self, other: &Money) -> Money {
        Money(self.0 + other.0)
    }
}

impl Add<Money> for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Money) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Money) -> Money {
        Money(self.0 - other.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

/// Unit price times a quantity.
impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, quantity: Decimal) -> Money {
        Money(self.0 * quantity)
    }
}

impl Zero for Money {
    fn zero() -> Self {
        Money(Decimal::zero())
    }

    fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}
