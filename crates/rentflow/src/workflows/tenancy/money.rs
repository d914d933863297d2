use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::LifecycleError;

/// Largest amount accepted for any single figure: a rent, a deposit, a fee, or a payment.
/// Sums over a schedule stay far inside `Decimal`'s range.
pub const MAX_UNITS: i64 = 1_000_000_000_000;

/// Fixed-point monetary amount in the currency of the owning lease.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Whole currency units, handy for rent figures.
    pub fn from_units(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// Accepts only amounts strictly greater than zero and at most [`MAX_UNITS`].
    pub fn positive(amount: Decimal, field: &'static str) -> Result<Self, LifecycleError> {
        if amount > Decimal::ZERO {
            Self::bounded(amount, field)
        } else {
            Err(LifecycleError::validation(field, "must be greater than zero"))
        }
    }

    pub fn non_negative(amount: Decimal, field: &'static str) -> Result<Self, LifecycleError> {
        if amount >= Decimal::ZERO {
            Self::bounded(amount, field)
        } else {
            Err(LifecycleError::validation(field, "must not be negative"))
        }
    }

    fn bounded(amount: Decimal, field: &'static str) -> Result<Self, LifecycleError> {
        if amount > Decimal::from(MAX_UNITS) {
            return Err(LifecycleError::validation(
                field,
                format!("must not exceed {MAX_UNITS}"),
            ));
        }
        Ok(Self(amount))
    }

    pub fn amount(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn checked_add(self, rhs: Self, field: &'static str) -> Result<Self, LifecycleError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or_else(|| LifecycleError::validation(field, "amount overflows"))
    }

    pub fn checked_sub(self, rhs: Self, field: &'static str) -> Result<Self, LifecycleError> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or_else(|| LifecycleError::validation(field, "amount overflows"))
    }

    /// Difference clamped at zero; used for outstanding balances.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        if rhs.0 >= self.0 {
            Self::ZERO
        } else {
            Self(self.0 - rhs.0)
        }
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// ISO 4217 style currency code, stored upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn parse(raw: &str) -> Result<Self, LifecycleError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code))
        } else {
            Err(LifecycleError::validation(
                "currency",
                format!("'{raw}' is not a three letter currency code"),
            ))
        }
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self("USD".to_string())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
