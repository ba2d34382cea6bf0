use chrono::{DateTime, Utc};
use notary_types::{AccountId, CreditOperation};

use crate::balance::BalanceRow;
use crate::entry::{EntryDraft, LedgerEntry};
use crate::error::LedgerError;

/// Append-only credit ledger. The source of truth for entitlement.
///
/// Implementations must make `append` atomic per account: the entry is
/// written only if the account's tail is still at `expected_seq`, the
/// resulting balance is non-negative, and no entry with the same operation
/// and reference id exists yet.
pub trait CreditLedger: Send + Sync {
    /// Append a drafted entry after tail `expected_seq` (0 for an empty
    /// account).
    fn append(
        &self,
        account: &AccountId,
        expected_seq: u64,
        draft: &EntryDraft,
        at: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError>;

    /// All entries for an account, in sequence order.
    fn entries(&self, account: &AccountId) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Latest entry for an account.
    fn tail(&self, account: &AccountId) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Entry recorded for `(operation, reference_id)`, if any.
    fn find_by_reference(
        &self,
        account: &AccountId,
        operation: CreditOperation,
        reference_id: &str,
    ) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Accounts with at least one entry.
    fn accounts(&self) -> Result<Vec<AccountId>, LedgerError>;
}

/// Balance cache: a derived, rebuildable projection of the ledger.
pub trait BalanceCache: Send + Sync {
    fn get(&self, account: &AccountId) -> Result<Option<BalanceRow>, LedgerError>;

    /// Store `row` if the current version equals `expected_version`
    /// (`None` meaning no row exists). The stored row's version is bumped
    /// and returned. A row is never replaced by one projected from an
    /// older ledger position.
    fn compare_and_swap(
        &self,
        expected_version: Option<u64>,
        row: BalanceRow,
    ) -> Result<BalanceRow, LedgerError>;
}
