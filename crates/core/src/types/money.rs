//! Monetary amounts using decimal arithmetic.
//!
//! Prices and totals are stored as `NUMERIC(12, 2)` in the store currency.
//! Amounts never go through floating point: request bodies are parsed
//! straight into [`rust_decimal::Decimal`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors produced when constructing or combining [`Money`] values.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneyError {
    /// Amounts are never negative.
    #[error("amount cannot be negative")]
    Negative,
    /// Arithmetic left the representable range.
    #[error("amount overflow")]
    Overflow,
}

/// A non-negative amount in the store currency, rounded to cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Zero in the store currency.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create an amount, rounding to two decimal places (banker's rounding).
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Negative` for amounts below zero.
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        Ok(Self(amount.round_dp(2)))
    }

    /// Create an amount from a whole number of cents.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Negative` for negative input.
    pub fn from_cents(cents: i64) -> Result<Self, MoneyError> {
        Self::new(Decimal::new(cents, 2))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units at this unit price.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Negative` for a negative quantity and
    /// `MoneyError::Overflow` if the product does not fit.
    pub fn times(self, quantity: i32) -> Result<Self, MoneyError> {
        if quantity < 0 {
            return Err(MoneyError::Negative);
        }
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    /// Sum of two amounts.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Overflow` if the sum does not fit.
    pub fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    /// Sum a sequence of amounts.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Overflow` if the total does not fit.
    pub fn try_sum(amounts: impl IntoIterator<Item = Self>) -> Result<Self, MoneyError> {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, m| acc.checked_add(m))
    }

    /// Whether two amounts differ by no more than `tolerance`.
    #[must_use]
    pub fn within(self, other: Self, tolerance: Self) -> bool {
        (self.0 - other.0).abs() <= tolerance.0
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
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
        Ok(Self::new(amount)?)
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

    fn cents(c: i64) -> Money {
        Money::from_cents(c).unwrap()
    }

    #[test]
    fn test_rejects_negative() {
        assert_eq!(Money::new(Decimal::new(-1, 2)), Err(MoneyError::Negative));
        assert!(Money::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_rounds_to_cents() {
        let m = Money::new(Decimal::new(10_005, 3)).unwrap();
        assert_eq!(m.amount(), Decimal::new(1000, 2));
    }

    #[test]
    fn test_times() {
        assert_eq!(cents(1000).times(2).unwrap(), cents(2000));
        assert_eq!(cents(1999).times(0).unwrap(), Money::ZERO);
        assert_eq!(cents(100).times(-1), Err(MoneyError::Negative));
    }

    #[test]
    fn test_within_tolerance() {
        let tolerance = cents(1);
        assert!(cents(2000).within(cents(2001), tolerance));
        assert!(cents(2001).within(cents(2000), tolerance));
        assert!(!cents(2000).within(cents(2002), tolerance));
    }

    #[test]
    fn test_sum() {
        let total = Money::try_sum([cents(150), cents(250), cents(100)]).unwrap();
        assert_eq!(total, cents(500));
    }

    #[test]
    fn test_deserialize_accepts_numbers_and_strings() {
        let from_number: Money = serde_json::from_str("10.5").unwrap();
        let from_string: Money = serde_json::from_str("\"10.50\"").unwrap();
        assert_eq!(from_number, from_string);

        let negative: Result<Money, _> = serde_json::from_str("-1");
        assert!(negative.is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(cents(2000).to_string(), "20.00");
    }
}
