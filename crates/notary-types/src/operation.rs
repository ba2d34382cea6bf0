use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Balance-affecting operation recorded in the credit ledger.
///
/// Amounts are always stored as positive magnitudes; the operation decides
/// the direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditOperation {
    /// Credits purchased or granted.
    Add,
    /// One credit spent on a registration.
    Consume,
    /// A previous consumption returned.
    Refund,
    /// Manual positive correction.
    Adjust,
    /// Credits that lapsed.
    Expire,
}

impl CreditOperation {
    /// `true` if the operation increases the available balance.
    pub fn is_credit(self) -> bool {
        matches!(self, Self::Add | Self::Refund | Self::Adjust)
    }

    /// Apply this operation to a running balance.
    ///
    /// Returns `None` when a debit would take the balance below zero or a
    /// credit would overflow.
    pub fn apply(self, balance: u64, amount: u64) -> Option<u64> {
        if self.is_credit() {
            balance.checked_add(amount)
        } else {
            balance.checked_sub(amount)
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Consume => "CONSUME",
            Self::Refund => "REFUND",
            Self::Adjust => "ADJUST",
            Self::Expire => "EXPIRE",
        }
    }
}

impl fmt::Display for CreditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreditOperation {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(Self::Add),
            "CONSUME" => Ok(Self::Consume),
            "REFUND" => Ok(Self::Refund),
            "ADJUST" => Ok(Self::Adjust),
            "EXPIRE" => Ok(Self::Expire),
            other => Err(TypeError::UnknownOperation(other.to_string())),
        }
    }
}
