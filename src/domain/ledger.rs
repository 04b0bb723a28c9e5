use super::order::OrderNumber;
use super::user::UserId;
use crate::error::LoyaltyError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A quantity of loyalty points.
///
/// Thin wrapper around `rust_decimal::Decimal`; accrual values arrive as JSON
/// numbers with fractional parts, so floating point is never used for them.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Points(pub Decimal);

/// A strictly positive number of points, used for debits.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, LoyaltyError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(LoyaltyError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LoyaltyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Points {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Points {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Add for Points {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Points {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Points {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Points {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// Spendable and lifetime-spent points of a single user.
///
/// `current` never drops below zero: the only way down is [`Balance::debit`],
/// which refuses to overdraw.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub current: Points,
    pub withdrawn: Points,
}

impl Balance {
    /// Adds accrued points. Negative accruals are clamped to zero.
    pub fn credit(&mut self, points: Points) {
        if points > Points::ZERO {
            self.current += points;
        }
    }

    /// Moves `amount` from `current` to `withdrawn` if there is enough.
    pub fn debit(&mut self, amount: Amount) -> Result<(), LoyaltyError> {
        let amount = Points::from(amount);
        if self.current >= amount {
            self.current -= amount;
            self.withdrawn += amount;
            Ok(())
        } else {
            Err(LoyaltyError::NotEnoughMoney)
        }
    }
}

/// Append-only record of a successful debit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub user_id: UserId,
    /// Reference supplied by the user; lives in its own namespace, unrelated to orders.
    pub order: OrderNumber,
    pub sum: Points,
    pub processed_at: DateTime<Utc>,
}
