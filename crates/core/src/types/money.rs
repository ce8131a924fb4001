//! Kenyan shilling amounts using decimal arithmetic.
//!
//! All prices, order totals and payment amounts in the marketplace are KES.
//! Amounts are kept as [`Decimal`] with two fractional digits so that order
//! totals never pick up floating point drift.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Money`] amount.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The input is not a decimal number.
    #[error("amount is not a valid number")]
    Invalid,
    /// The amount is below zero.
    #[error("amount cannot be negative")]
    Negative,
    /// The amount has more than two fractional digits.
    #[error("amount cannot have more than two decimal places")]
    TooPrecise,
    /// The amount does not fit the storage column.
    #[error("amount is too large")]
    Overflow,
}

/// An amount of Kenyan shillings.
///
/// ```
/// use shop_next_door_core::Money;
///
/// let price = Money::parse("1250.5").unwrap();
/// assert_eq!(price.display(), "KES 1,250.50");
/// assert_eq!(price.to_mpesa_amount(), Some(1251));
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// ISO 4217 code of the only currency the marketplace trades in.
    pub const CURRENCY: &'static str = "KES";

    /// Largest amount accepted (fits `NUMERIC(12, 2)`).
    pub const MAX: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

    /// Zero shillings.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount, rejecting negatives and sub-cent precision.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError`] if the amount is negative, has more than two
    /// decimal places, or exceeds [`Money::MAX`].
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        let normalized = amount.normalize();
        if normalized.scale() > 2 {
            return Err(MoneyError::TooPrecise);
        }
        if amount > Self::MAX {
            return Err(MoneyError::Overflow);
        }
        let mut amount = amount;
        amount.rescale(2);
        Ok(Self(amount))
    }

    /// Build an amount from whole shillings.
    #[must_use]
    pub fn from_shillings(shillings: u32) -> Self {
        Self(Decimal::new(i64::from(shillings) * 100, 2))
    }

    /// Parse a user-entered amount such as `"1250"`, `"1,250.50"`.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Invalid`] if the input is not a number, otherwise
    /// the same errors as [`Money::new`].
    pub fn parse(s: &str) -> Result<Self, MoneyError> {
        let cleaned: String = s
            .trim()
            .trim_start_matches(Self::CURRENCY)
            .chars()
            .filter(|c| *c != ',' && !c.is_whitespace())
            .collect();
        if cleaned.is_empty() {
            return Err(MoneyError::Invalid);
        }
        let amount = Decimal::from_str(&cleaned).map_err(|_| MoneyError::Invalid)?;
        Self::new(amount)
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether this is zero shillings.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Multiply a unit price by a quantity.
    ///
    /// Returns `None` on overflow or a negative quantity.
    #[must_use]
    pub fn checked_mul(&self, quantity: i32) -> Option<Self> {
        if quantity < 0 {
            return None;
        }
        let total = self.0.checked_mul(Decimal::from(quantity))?;
        (total <= Self::MAX).then_some(Self(total))
    }

    /// Amount in whole shillings as M-Pesa expects it.
    ///
    /// Daraja rejects fractional amounts, so cents are rounded up; the
    /// customer never pays less than the order total. Returns `None` for zero.
    #[must_use]
    pub fn to_mpesa_amount(&self) -> Option<u64> {
        if self.0.is_zero() {
            return None;
        }
        self.0.ceil().to_u64()
    }

    /// Format for display, e.g. `KES 12,500.00`.
    #[must_use]
    pub fn display(&self) -> String {
        let mut rounded = self.0.round_dp(2);
        rounded.rescale(2);
        let text = rounded.to_string();
        let (whole, cents) = text.split_once('.').unwrap_or((&text, "00"));

        let digits: Vec<char> = whole.chars().collect();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.iter().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(*c);
        }

        format!("{} {grouped}.{cents}", Self::CURRENCY)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(amount))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_grouping_and_prefix() {
        assert_eq!(Money::parse("1,250").unwrap(), Money::from_shillings(1250));
        assert_eq!(Money::parse("KES 99.50").unwrap().amount(), Decimal::new(9950, 2));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(Money::parse(""), Err(MoneyError::Invalid));
        assert_eq!(Money::parse("ten"), Err(MoneyError::Invalid));
        assert_eq!(Money::parse("-5"), Err(MoneyError::Negative));
        assert_eq!(Money::parse("1.005"), Err(MoneyError::TooPrecise));
        assert_eq!(Money::parse("99999999999"), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_trailing_zeros_are_not_too_precise() {
        assert!(Money::parse("12.5000").is_ok());
    }

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Money::from_shillings(0).display(), "KES 0.00");
        assert_eq!(Money::from_shillings(999).display(), "KES 999.00");
        assert_eq!(Money::from_shillings(1000).display(), "KES 1,000.00");
        assert_eq!(Money::parse("1234567.8").unwrap().display(), "KES 1,234,567.80");
    }

    #[test]
    fn test_mpesa_amount_rounds_up() {
        assert_eq!(Money::parse("100").unwrap().to_mpesa_amount(), Some(100));
        assert_eq!(Money::parse("100.01").unwrap().to_mpesa_amount(), Some(101));
        assert_eq!(Money::ZERO.to_mpesa_amount(), None);
    }

    #[test]
    fn test_checked_mul_and_sum() {
        let price = Money::parse("49.99").unwrap();
        let line = price.checked_mul(3).unwrap();
        assert_eq!(line, Money::parse("149.97").unwrap());
        assert!(price.checked_mul(-1).is_none());

        let total: Money = [line, Money::from_shillings(50)].into_iter().sum();
        assert_eq!(total, Money::parse("199.97").unwrap());
    }

    #[test]
    fn test_serializes_as_string() {
        let json = serde_json::to_string(&Money::parse("10.5").unwrap()).unwrap();
        assert_eq!(json, "\"10.50\"");
    }
}
