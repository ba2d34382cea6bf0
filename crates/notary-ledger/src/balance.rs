use notary_types::api::BalanceResponse;
use notary_types::{AccountId, CreditOperation, LedgerEntryId};
use serde::{Deserialize, Serialize};

use crate::entry::LedgerEntry;
use crate::error::LedgerError;

/// Cached balance for one account.
///
/// Invariant: `total_credits == available_credits + used_credits`, and the
/// row equals the fold of the ledger up to `last_ledger_seq`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRow {
    pub account_id: AccountId,
    pub total_credits: u64,
    pub available_credits: u64,
    pub used_credits: u64,
    /// Optimistic concurrency token, bumped on every write.
    pub version: u64,
    pub last_ledger_id: Option<LedgerEntryId>,
    pub last_ledger_seq: u64,
}

impl BalanceRow {
    /// Zero balance for an account with no ledger entries.
    pub fn empty(account: AccountId) -> Self {
        Self {
            account_id: account,
            total_credits: 0,
            available_credits: 0,
            used_credits: 0,
            version: 0,
            last_ledger_id: None,
            last_ledger_seq: 0,
        }
    }

    /// `true` if the balance fields agree with `projection`, ignoring version.
    pub fn agrees_with(&self, projection: &BalanceProjection) -> bool {
        self.total_credits == projection.total
            && self.available_credits == projection.available
            && self.used_credits == projection.used
            && self.last_ledger_seq == projection.last_seq
    }

    pub fn to_response(&self) -> BalanceResponse {
        BalanceResponse {
            account_id: self.account_id.clone(),
            total_credits: self.total_credits,
            available_credits: self.available_credits,
            used_credits: self.used_credits,
            version: self.version,
        }
    }
}

/// Running fold of ledger entries into balance figures.
///
/// `total = ADD + ADJUST - EXPIRE`, `used = CONSUME - REFUND`,
/// `available = total - used`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BalanceProjection {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub last_id: Option<LedgerEntryId>,
    pub last_seq: u64,
}

impl BalanceProjection {
    /// Continue a projection from a cached row.
    pub fn from_row(row: &BalanceRow) -> Self {
        Self {
            total: row.total_credits,
            available: row.available_credits,
            used: row.used_credits,
            last_id: row.last_ledger_id,
            last_seq: row.last_ledger_seq,
        }
    }

    /// Fold a full account history.
    pub fn fold<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Result<Self, LedgerError> {
        let mut projection = Self::default();
        for entry in entries {
            projection.apply(entry)?;
        }
        Ok(projection)
    }

    /// Apply the next entry. Entries must arrive in sequence order and the
    /// stored `balance_after` must match the computed balance.
    pub fn apply(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        if entry.seq != self.last_seq + 1 {
            return Err(LedgerError::IntegrityViolation {
                seq: entry.seq,
                reason: format!("expected seq {}", self.last_seq + 1),
            });
        }

        let overflow = || LedgerError::IntegrityViolation {
            seq: entry.seq,
            reason: format!("{} of {} leaves balance out of range", entry.operation, entry.amount),
        };
        let amount = entry.amount;
        match entry.operation {
            CreditOperation::Add | CreditOperation::Adjust => {
                self.total = self.total.checked_add(amount).ok_or_else(overflow)?;
            }
            CreditOperation::Expire => {
                self.total = self.total.checked_sub(amount).ok_or_else(overflow)?;
            }
            CreditOperation::Consume => {
                self.used = self.used.checked_add(amount).ok_or_else(overflow)?;
            }
            CreditOperation::Refund => {
                self.used = self.used.checked_sub(amount).ok_or_else(overflow)?;
            }
        }
        self.available = entry
            .operation
            .apply(self.available, amount)
            .ok_or_else(overflow)?;

        if self.total != self.available + self.used {
            return Err(LedgerError::IntegrityViolation {
                seq: entry.seq,
                reason: "total differs from available + used".into(),
            });
        }
        if entry.balance_after != self.available {
            return Err(LedgerError::IntegrityViolation {
                seq: entry.seq,
                reason: format!(
                    "balance_after {} but fold gives {}",
                    entry.balance_after, self.available
                ),
            });
        }

        self.last_id = Some(entry.id);
        self.last_seq = entry.seq;
        Ok(())
    }

    /// Materialize as a cache row. `version` is assigned by the cache on write.
    pub fn into_row(self, account: AccountId, version: u64) -> BalanceRow {
        BalanceRow {
            account_id: account,
            total_credits: self.total,
            available_credits: self.available,
            used_credits: self.used,
            version,
            last_ledger_id: self.last_id,
            last_ledger_seq: self.last_seq,
        }
    }
}
