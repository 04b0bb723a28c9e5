use super::ledger::Points;
use super::user::UserId;
use crate::error::LoyaltyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A Luhn-valid order number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Parses a raw order number, trimming surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self, LoyaltyError> {
        let digits = raw.trim();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LoyaltyError::ValidationError(format!(
                "order number must be a non-empty string of digits, got {:?}",
                raw
            )));
        }
        if !luhn_valid(digits) {
            return Err(LoyaltyError::ValidationError(format!(
                "order number {} fails the Luhn check",
                digits
            )));
        }
        Ok(Self(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn luhn_valid(digits: &str) -> bool {
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

impl TryFrom<String> for OrderNumber {
    type Error = LoyaltyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Invalid,
    Processed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Invalid)
    }

    /// Status only moves forward, and nothing leaves a terminal status.
    pub fn can_advance_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::New => false,
            Self::Processing => self == Self::New,
            Self::Invalid | Self::Processed => true,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::Processing => "PROCESSING",
            Self::Invalid => "INVALID",
            Self::Processed => "PROCESSED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub number: OrderNumber,
    pub user_id: UserId,
    pub status: OrderStatus,
    /// Set only once the order reaches `PROCESSED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Points>,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    pub fn new(number: OrderNumber, user_id: UserId) -> Self {
        Self {
            number,
            user_id,
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
        }
    }
}

/// Status vocabulary of the external accrual service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    Registered,
    Invalid,
    Processing,
    Processed,
}

impl AccrualStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Invalid)
    }
}

/// Decoded body of `GET /api/orders/{number}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualOrder {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(default)]
    pub accrual: Option<Points>,
}
