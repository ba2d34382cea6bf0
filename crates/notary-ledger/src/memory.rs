use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use notary_types::{AccountId, CreditOperation};

use crate::balance::BalanceRow;
use crate::entry::{EntryDraft, LedgerEntry};
use crate::error::LedgerError;
use crate::traits::{BalanceCache, CreditLedger};

/// In-memory credit ledger for tests, local demos, and embedding.
///
/// Each account's stream sits behind its own mutex, so appends to different
/// accounts never contend.
#[derive(Default)]
pub struct InMemoryCreditLedger {
    streams: RwLock<HashMap<AccountId, Arc<Mutex<AccountStream>>>>,
}

#[derive(Default)]
struct AccountStream {
    entries: Vec<LedgerEntry>,
    references: HashSet<(CreditOperation, String)>,
}

impl InMemoryCreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&self, account: &AccountId) -> Result<Option<Arc<Mutex<AccountStream>>>, LedgerError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| LedgerError::LockPoisoned("ledger index"))?;
        Ok(streams.get(account).cloned())
    }

    fn stream_or_create(&self, account: &AccountId) -> Result<Arc<Mutex<AccountStream>>, LedgerError> {
        if let Some(stream) = self.stream(account)? {
            return Ok(stream);
        }
        let mut streams = self
            .streams
            .write()
            .map_err(|_| LedgerError::LockPoisoned("ledger index"))?;
        Ok(streams.entry(account.clone()).or_default().clone())
    }

    fn read<T>(
        &self,
        account: &AccountId,
        f: impl FnOnce(&AccountStream) -> T,
    ) -> Result<Option<T>, LedgerError> {
        let Some(stream) = self.stream(account)? else {
            return Ok(None);
        };
        let guard = stream
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("account stream"))?;
        Ok(Some(f(&guard)))
    }
}

impl CreditLedger for InMemoryCreditLedger {
    fn append(
        &self,
        account: &AccountId,
        expected_seq: u64,
        draft: &EntryDraft,
        at: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        if draft.amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        let stream = self.stream_or_create(account)?;
        let mut stream = stream
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("account stream"))?;

        let tail = stream.entries.last();
        let actual_seq = tail.map_or(0, |e| e.seq);
        if actual_seq != expected_seq {
            return Err(LedgerError::TailMoved {
                expected: expected_seq,
                actual: actual_seq,
            });
        }

        let reference_key = draft
            .reference
            .as_ref()
            .map(|r| (draft.operation, r.id.clone()));
        if let Some(key) = &reference_key {
            if stream.references.contains(key) {
                return Err(LedgerError::DuplicateReference {
                    operation: key.0,
                    reference_id: key.1.clone(),
                });
            }
        }

        let available = tail.map_or(0, |e| e.balance_after);
        let balance_after = draft
            .operation
            .apply(available, draft.amount)
            .ok_or_else(|| LedgerError::InsufficientBalance {
                account: account.clone(),
                available,
                requested: draft.amount,
            })?;

        let entry = LedgerEntry::seal(account, tail, draft, balance_after, at);
        stream.entries.push(entry.clone());
        if let Some(key) = reference_key {
            stream.references.insert(key);
        }
        Ok(entry)
    }

    fn entries(&self, account: &AccountId) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .read(account, |s| s.entries.clone())?
            .unwrap_or_default())
    }

    fn tail(&self, account: &AccountId) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.read(account, |s| s.entries.last().cloned())?.flatten())
    }

    fn find_by_reference(
        &self,
        account: &AccountId,
        operation: CreditOperation,
        reference_id: &str,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self
            .read(account, |s| {
                s.entries
                    .iter()
                    .rev()
                    .find(|e| e.matches(operation, reference_id))
                    .cloned()
            })?
            .flatten())
    }

    fn accounts(&self) -> Result<Vec<AccountId>, LedgerError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| LedgerError::LockPoisoned("ledger index"))?;
        let mut accounts: Vec<AccountId> = streams.keys().cloned().collect();
        accounts.sort();
        Ok(accounts)
    }
}

/// In-memory balance cache with optimistic versioning.
#[derive(Default)]
pub struct InMemoryBalanceCache {
    rows: RwLock<HashMap<AccountId, BalanceRow>>,
}

impl InMemoryBalanceCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BalanceCache for InMemoryBalanceCache {
    fn get(&self, account: &AccountId) -> Result<Option<BalanceRow>, LedgerError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| LedgerError::LockPoisoned("balance cache"))?;
        Ok(rows.get(account).cloned())
    }

    fn compare_and_swap(
        &self,
        expected_version: Option<u64>,
        mut row: BalanceRow,
    ) -> Result<BalanceRow, LedgerError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| LedgerError::LockPoisoned("balance cache"))?;

        let current = rows.get(&row.account_id);
        let found = current.map(|r| r.version);
        if found != expected_version {
            return Err(LedgerError::VersionConflict {
                expected: expected_version,
                found,
            });
        }
        if let Some(current) = current {
            if current.last_ledger_seq > row.last_ledger_seq {
                return Err(LedgerError::StaleProjection {
                    cached_seq: current.last_ledger_seq,
                    offered_seq: row.last_ledger_seq,
                });
            }
        }

        row.version = found.map_or(1, |v| v + 1);
        rows.insert(row.account_id.clone(), row.clone());
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Reference;

    fn account(name: &str) -> AccountId {
        AccountId::new(name).unwrap()
    }

    fn add(amount: u64) -> EntryDraft {
        EntryDraft::new(CreditOperation::Add, amount, "purchase")
    }

    #[test]
    fn append_assigns_contiguous_sequence() {
        let ledger = InMemoryCreditLedger::new();
        let a = account("a");
        let first = ledger.append(&a, 0, &add(3), Utc::now()).unwrap();
        let second = ledger.append(&a, 1, &add(2), Utc::now()).unwrap();
        assert_eq!((first.seq, second.seq), (1, 2));
        assert_eq!(second.balance_after, 5);
        assert_eq!(ledger.tail(&a).unwrap().unwrap().id, second.id);
    }

    #[test]
    fn stale_expected_seq_is_tail_moved() {
        let ledger = InMemoryCreditLedger::new();
        let a = account("a");
        ledger.append(&a, 0, &add(1), Utc::now()).unwrap();
        let err = ledger.append(&a, 0, &add(1), Utc::now()).unwrap_err();
        assert_eq!(err, LedgerError::TailMoved { expected: 0, actual: 1 });
        assert!(err.is_retryable());
    }

    #[test]
    fn overdraft_writes_nothing() {
        let ledger = InMemoryCreditLedger::new();
        let a = account("a");
        let consume = EntryDraft::new(CreditOperation::Consume, 1, "registration");
        let err = ledger.append(&a, 0, &consume, Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { available: 0, .. }));
        assert!(ledger.entries(&a).unwrap().is_empty());
    }

    #[test]
    fn duplicate_reference_is_rejected_per_operation() {
        let ledger = InMemoryCreditLedger::new();
        let a = account("a");
        ledger.append(&a, 0, &add(5), Utc::now()).unwrap();
        let consume = EntryDraft::new(CreditOperation::Consume, 1, "registration")
            .with_reference(Reference::registration("r-1"));
        ledger.append(&a, 1, &consume, Utc::now()).unwrap();

        let err = ledger.append(&a, 2, &consume, Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateReference { .. }));

        let refund = EntryDraft::new(CreditOperation::Refund, 1, "failed")
            .with_reference(Reference::registration("r-1"));
        assert!(ledger.append(&a, 2, &refund, Utc::now()).is_ok());
        assert!(ledger
            .find_by_reference(&a, CreditOperation::Refund, "r-1")
            .unwrap()
            .is_some());
    }

    #[test]
    fn zero_amount_is_rejected() {
        let ledger = InMemoryCreditLedger::new();
        assert_eq!(
            ledger.append(&account("a"), 0, &add(0), Utc::now()),
            Err(LedgerError::ZeroAmount)
        );
    }

    #[test]
    fn accounts_are_independent() {
        let ledger = InMemoryCreditLedger::new();
        ledger.append(&account("b"), 0, &add(1), Utc::now()).unwrap();
        ledger.append(&account("a"), 0, &add(2), Utc::now()).unwrap();
        assert_eq!(ledger.accounts().unwrap(), vec![account("a"), account("b")]);
        assert_eq!(ledger.tail(&account("b")).unwrap().unwrap().balance_after, 1);
        assert!(ledger.tail(&account("c")).unwrap().is_none());
    }

    #[test]
    fn cache_cas_bumps_version_and_detects_conflicts() {
        let cache = InMemoryBalanceCache::new();
        let a = account("a");
        let mut row = BalanceRow::empty(a.clone());
        row.last_ledger_seq = 1;

        let stored = cache.compare_and_swap(None, row.clone()).unwrap();
        assert_eq!(stored.version, 1);

        assert!(matches!(
            cache.compare_and_swap(None, row.clone()),
            Err(LedgerError::VersionConflict { expected: None, found: Some(1) })
        ));

        row.last_ledger_seq = 2;
        assert_eq!(cache.compare_and_swap(Some(1), row).unwrap().version, 2);
    }

    #[test]
    fn cache_never_regresses_to_older_seq() {
        let cache = InMemoryBalanceCache::new();
        let a = account("a");
        let mut newer = BalanceRow::empty(a.clone());
        newer.last_ledger_seq = 5;
        cache.compare_and_swap(None, newer).unwrap();

        let mut older = BalanceRow::empty(a.clone());
        older.last_ledger_seq = 4;
        assert_eq!(
            cache.compare_and_swap(Some(1), older),
            Err(LedgerError::StaleProjection { cached_seq: 5, offered_seq: 4 })
        );
    }
}
