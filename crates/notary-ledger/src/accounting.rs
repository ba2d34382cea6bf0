//! Credit accounting service.
//!
//! Every balance-changing operation appends to the ledger first and then
//! folds the new entry into the balance cache. Both steps are guarded by
//! compare-and-swap (ledger tail for the append, row version for the cache)
//! and retried on conflict, so concurrent callers on one account serialize
//! without cross-account locking. If the cache step fails after the append
//! succeeded, the ledger still holds the truth and `reconcile` repairs the
//! row.

use std::sync::Arc;

use notary_types::api::{ConsumeCreditResponse, ReconcileResponse};
use notary_types::{AccountId, Clock, CreditOperation, LedgerEntryId, SystemClock};
use tracing::{debug, info, warn};

use crate::balance::{BalanceProjection, BalanceRow};
use crate::entry::{EntryDraft, LedgerEntry, Reference};
use crate::error::LedgerError;
use crate::events::{BalanceChange, BalanceEvent, BalanceEvents};
use crate::traits::{BalanceCache, CreditLedger};
use crate::validation::{StreamValidator, ValidationReport};

/// Upper bound on compare-and-swap retries before reporting contention.
pub const MAX_CAS_ATTEMPTS: usize = 32;

/// Result of `consume_credit`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// A new CONSUME entry was written.
    Applied {
        entry_id: LedgerEntryId,
        remaining_balance: u64,
    },
    /// A CONSUME for this reference already exists; nothing was written.
    AlreadyApplied { entry_id: LedgerEntryId },
}

impl ConsumeOutcome {
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Self::AlreadyApplied { .. })
    }

    pub fn entry_id(&self) -> LedgerEntryId {
        match self {
            Self::Applied { entry_id, .. } | Self::AlreadyApplied { entry_id } => *entry_id,
        }
    }

    pub fn to_response(&self) -> ConsumeCreditResponse {
        match self {
            Self::Applied {
                remaining_balance, ..
            } => ConsumeCreditResponse {
                success: true,
                idempotent: None,
                remaining_balance: Some(*remaining_balance),
            },
            // Nothing was written; callers read `idempotent` as "already applied".
            Self::AlreadyApplied { .. } => ConsumeCreditResponse {
                success: false,
                idempotent: Some(true),
                remaining_balance: None,
            },
        }
    }
}

/// Result of `refund_credit`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefundOutcome {
    Applied { entry_id: LedgerEntryId, remaining_balance: u64 },
    AlreadyApplied { entry_id: LedgerEntryId },
}

/// Result of `grant`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrantOutcome {
    Applied { entry_id: LedgerEntryId, remaining_balance: u64 },
    AlreadyApplied { entry_id: LedgerEntryId },
}

/// Result of `reconcile`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileReport {
    pub account_id: AccountId,
    pub was_consistent: bool,
    pub corrected: bool,
    /// Available balance according to the ledger.
    pub ledger_available: u64,
    /// Available balance the cache held before reconciliation.
    pub cached_available: Option<u64>,
}

impl ReconcileReport {
    pub fn to_response(&self) -> ReconcileResponse {
        ReconcileResponse {
            was_consistent: self.was_consistent,
            corrected: self.corrected,
        }
    }
}

enum Recorded {
    Applied(LedgerEntry),
    AlreadyApplied(LedgerEntryId),
}

/// Credit ledger plus balance cache, kept consistent.
#[derive(Clone)]
pub struct CreditAccounting {
    ledger: Arc<dyn CreditLedger>,
    cache: Arc<dyn BalanceCache>,
    clock: Arc<dyn Clock>,
    events: BalanceEvents,
}

impl CreditAccounting {
    pub fn new(ledger: Arc<dyn CreditLedger>, cache: Arc<dyn BalanceCache>) -> Self {
        Self {
            ledger,
            cache,
            clock: Arc::new(SystemClock),
            events: BalanceEvents::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ledger(&self) -> &Arc<dyn CreditLedger> {
        &self.ledger
    }

    pub fn cache(&self) -> &Arc<dyn BalanceCache> {
        &self.cache
    }

    pub fn events(&self) -> &BalanceEvents {
        &self.events
    }

    /// Consume one credit for `reference_id`.
    ///
    /// Idempotent: a second call with the same reference returns
    /// `AlreadyApplied` and writes nothing. With no prior consumption and an
    /// empty balance the call fails with `InsufficientBalance` and writes
    /// nothing.
    pub fn consume_credit(
        &self,
        account: &AccountId,
        reference_id: &str,
        reason: &str,
    ) -> Result<ConsumeOutcome, LedgerError> {
        let draft = EntryDraft::new(CreditOperation::Consume, 1, reason)
            .with_reference(Reference::registration(reference_id));
        match self.record_unique(account, &draft)? {
            Recorded::Applied(entry) => {
                info!(account = %account, reference = reference_id, remaining = entry.balance_after, "credit consumed");
                Ok(ConsumeOutcome::Applied {
                    entry_id: entry.id,
                    remaining_balance: entry.balance_after,
                })
            }
            Recorded::AlreadyApplied(entry_id) => {
                debug!(account = %account, reference = reference_id, "consumption already recorded");
                Ok(ConsumeOutcome::AlreadyApplied { entry_id })
            }
        }
    }

    /// Return the credit consumed for `reference_id`. Idempotent; fails with
    /// `ReferenceNotConsumed` if nothing was consumed for that reference.
    pub fn refund_credit(
        &self,
        account: &AccountId,
        reference_id: &str,
        reason: &str,
    ) -> Result<RefundOutcome, LedgerError> {
        let Some(consumed) =
            self.ledger
                .find_by_reference(account, CreditOperation::Consume, reference_id)?
        else {
            return Err(LedgerError::ReferenceNotConsumed(reference_id.to_string()));
        };

        let draft = EntryDraft::new(CreditOperation::Refund, consumed.amount, reason)
            .with_reference(Reference::registration(reference_id));
        match self.record_unique(account, &draft)? {
            Recorded::Applied(entry) => {
                info!(account = %account, reference = reference_id, "credit refunded");
                Ok(RefundOutcome::Applied {
                    entry_id: entry.id,
                    remaining_balance: entry.balance_after,
                })
            }
            Recorded::AlreadyApplied(entry_id) => Ok(RefundOutcome::AlreadyApplied { entry_id }),
        }
    }

    /// Add purchased credits. Idempotent per payment reference.
    pub fn grant(
        &self,
        account: &AccountId,
        amount: u64,
        payment_reference: &str,
        reason: &str,
    ) -> Result<GrantOutcome, LedgerError> {
        let draft = EntryDraft::new(CreditOperation::Add, amount, reason)
            .with_reference(Reference::payment(payment_reference));
        match self.record_unique(account, &draft)? {
            Recorded::Applied(entry) => {
                info!(account = %account, amount, payment = payment_reference, "credits granted");
                Ok(GrantOutcome::Applied {
                    entry_id: entry.id,
                    remaining_balance: entry.balance_after,
                })
            }
            Recorded::AlreadyApplied(entry_id) => Ok(GrantOutcome::AlreadyApplied { entry_id }),
        }
    }

    /// Manual positive correction.
    pub fn adjust(&self, account: &AccountId, amount: u64, reason: &str) -> Result<LedgerEntry, LedgerError> {
        self.record(account, &EntryDraft::new(CreditOperation::Adjust, amount, reason))
    }

    /// Remove lapsed credits. Fails if fewer than `amount` are available.
    pub fn expire(&self, account: &AccountId, amount: u64, reason: &str) -> Result<LedgerEntry, LedgerError> {
        self.record(account, &EntryDraft::new(CreditOperation::Expire, amount, reason))
    }

    /// Current balance, read through the cache. A missing row is rebuilt
    /// from the ledger.
    pub fn balance(&self, account: &AccountId) -> Result<BalanceRow, LedgerError> {
        if let Some(row) = self.cache.get(account)? {
            return Ok(row);
        }
        if self.ledger.tail(account)?.is_none() {
            return Ok(BalanceRow::empty(account.clone()));
        }
        self.reconcile(account)?;
        Ok(self
            .cache
            .get(account)?
            .unwrap_or_else(|| BalanceRow::empty(account.clone())))
    }

    /// Recompute the balance from the ledger and overwrite the cache row if
    /// it differs. The ledger wins; a correction is logged as a warning.
    pub fn reconcile(&self, account: &AccountId) -> Result<ReconcileReport, LedgerError> {
        let mut first_cached: Option<Option<u64>> = None;
        let mut first_consistent: Option<bool> = None;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let entries = self.ledger.entries(account)?;
            let projection = BalanceProjection::fold(&entries)?;
            let row = self.cache.get(account)?;

            let cached_available =
                *first_cached.get_or_insert(row.as_ref().map(|r| r.available_credits));
            let consistent = match &row {
                Some(row) => row.agrees_with(&projection),
                None => entries.is_empty(),
            };
            let was_consistent = *first_consistent.get_or_insert(consistent);

            if consistent {
                // A concurrent writer may have repaired the row between passes.
                return Ok(ReconcileReport {
                    account_id: account.clone(),
                    was_consistent,
                    corrected: false,
                    ledger_available: projection.available,
                    cached_available,
                });
            }

            let expected = row.as_ref().map(|r| r.version);
            let ledger_available = projection.available;
            match self
                .cache
                .compare_and_swap(expected, projection.into_row(account.clone(), 0))
            {
                Ok(stored) => {
                    warn!(
                        account = %account,
                        cached = ?cached_available,
                        ledger = ledger_available,
                        version = stored.version,
                        "balance cache drifted from ledger; corrected"
                    );
                    self.publish(&stored, BalanceChange::Reconciled);
                    return Ok(ReconcileReport {
                        account_id: account.clone(),
                        was_consistent: false,
                        corrected: true,
                        ledger_available,
                        cached_available,
                    });
                }
                Err(e) if e.is_retryable() => continue,
                Err(e) => return Err(e),
            }
        }

        Err(LedgerError::Contention {
            account: account.clone(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// Reconcile every account in the ledger.
    pub fn reconcile_all(&self) -> Result<Vec<ReconcileReport>, LedgerError> {
        self.ledger
            .accounts()?
            .iter()
            .map(|account| self.reconcile(account))
            .collect()
    }

    /// Account history in sequence order.
    pub fn history(&self, account: &AccountId) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.ledger.entries(account)
    }

    /// Full integrity report for an account's ledger stream.
    pub fn validate(&self, account: &AccountId) -> Result<ValidationReport, LedgerError> {
        Ok(StreamValidator::validate(account, &self.ledger.entries(account)?))
    }

    fn record_unique(&self, account: &AccountId, draft: &EntryDraft) -> Result<Recorded, LedgerError> {
        let reference_id = draft
            .reference
            .as_ref()
            .map(|r| r.id.clone())
            .unwrap_or_default();

        for _ in 0..MAX_CAS_ATTEMPTS {
            if let Some(existing) =
                self.ledger
                    .find_by_reference(account, draft.operation, &reference_id)?
            {
                return Ok(Recorded::AlreadyApplied(existing.id));
            }

            match self.try_append(account, draft) {
                Ok(entry) => return Ok(Recorded::Applied(entry)),
                // Lost a race with an identical request; the next pass finds it.
                Err(LedgerError::DuplicateReference { .. }) => continue,
                Err(e) if e.is_retryable() => continue,
                Err(e) => return Err(e),
            }
        }

        Err(LedgerError::Contention {
            account: account.clone(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    fn record(&self, account: &AccountId, draft: &EntryDraft) -> Result<LedgerEntry, LedgerError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            match self.try_append(account, draft) {
                Ok(entry) => {
                    info!(account = %account, operation = %draft.operation, amount = draft.amount, "ledger entry recorded");
                    return Ok(entry);
                }
                Err(e) if e.is_retryable() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(LedgerError::Contention {
            account: account.clone(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// One append attempt against the current tail, then project.
    fn try_append(&self, account: &AccountId, draft: &EntryDraft) -> Result<LedgerEntry, LedgerError> {
        let expected_seq = self.ledger.tail(account)?.map_or(0, |t| t.seq);
        let entry = self
            .ledger
            .append(account, expected_seq, draft, self.clock.now())?;

        if let Err(e) = self.project(account, &entry) {
            warn!(account = %account, seq = entry.seq, error = %e, "balance cache not updated; reconcile will repair it");
        }
        Ok(entry)
    }

    /// Fold `entry` into the cache row.
    fn project(&self, account: &AccountId, entry: &LedgerEntry) -> Result<BalanceRow, LedgerError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let row = self.cache.get(account)?;
            if let Some(row) = &row {
                if row.last_ledger_seq >= entry.seq {
                    return Ok(row.clone());
                }
            }

            let projection = match &row {
                Some(row) if row.last_ledger_seq + 1 == entry.seq => {
                    let mut projection = BalanceProjection::from_row(row);
                    projection.apply(entry)?;
                    projection
                }
                None if entry.seq == 1 => BalanceProjection::fold([entry])?,
                _ => BalanceProjection::fold(&self.ledger.entries(account)?)?,
            };

            let expected = row.as_ref().map(|r| r.version);
            match self
                .cache
                .compare_and_swap(expected, projection.into_row(account.clone(), 0))
            {
                Ok(stored) => {
                    self.publish(
                        &stored,
                        BalanceChange::Entry {
                            operation: entry.operation,
                            seq: entry.seq,
                        },
                    );
                    return Ok(stored);
                }
                Err(e) if e.is_retryable() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(LedgerError::Contention {
            account: account.clone(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    fn publish(&self, row: &BalanceRow, change: BalanceChange) {
        self.events.publish(BalanceEvent {
            account_id: row.account_id.clone(),
            available_credits: row.available_credits,
            version: row.version,
            change,
        });
    }
}

/// Seam used by the registration pipeline: consume on submit, refund on
/// failure.
pub trait CreditConsumer: Send + Sync {
    fn consume_credit(
        &self,
        account: &AccountId,
        reference_id: &str,
        reason: &str,
    ) -> Result<ConsumeOutcome, LedgerError>;

    fn refund_credit(
        &self,
        account: &AccountId,
        reference_id: &str,
        reason: &str,
    ) -> Result<RefundOutcome, LedgerError>;
}

impl CreditConsumer for CreditAccounting {
    fn consume_credit(
        &self,
        account: &AccountId,
        reference_id: &str,
        reason: &str,
    ) -> Result<ConsumeOutcome, LedgerError> {
        CreditAccounting::consume_credit(self, account, reference_id, reason)
    }

    fn refund_credit(
        &self,
        account: &AccountId,
        reference_id: &str,
        reason: &str,
    ) -> Result<RefundOutcome, LedgerError> {
        CreditAccounting::refund_credit(self, account, reference_id, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryBalanceCache, InMemoryCreditLedger};
    use proptest::prelude::*;

    fn service() -> CreditAccounting {
        CreditAccounting::new(
            Arc::new(InMemoryCreditLedger::new()),
            Arc::new(InMemoryBalanceCache::new()),
        )
    }

    fn account(name: &str) -> AccountId {
        AccountId::new(name).unwrap()
    }

    #[test]
    fn consume_decrements_once() {
        let svc = service();
        let a = account("alice");
        svc.grant(&a, 3, "pay-1", "purchase").unwrap();

        let first = svc.consume_credit(&a, "reg-1", "registration").unwrap();
        assert!(matches!(first, ConsumeOutcome::Applied { remaining_balance: 2, .. }));

        let second = svc.consume_credit(&a, "reg-1", "registration").unwrap();
        assert!(second.is_idempotent());
        assert_eq!(second.entry_id(), first.entry_id());
        assert_eq!(
            second.to_response(),
            ConsumeCreditResponse {
                success: false,
                idempotent: Some(true),
                remaining_balance: None
            }
        );

        assert_eq!(svc.balance(&a).unwrap().available_credits, 2);
        assert_eq!(svc.history(&a).unwrap().len(), 2);
    }

    #[test]
    fn consume_without_credit_writes_nothing() {
        let svc = service();
        let a = account("bob");
        let err = svc.consume_credit(&a, "reg-1", "registration").unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { available: 0, .. }));
        assert!(svc.history(&a).unwrap().is_empty());
        assert_eq!(svc.balance(&a).unwrap(), BalanceRow::empty(a));
    }

    #[test]
    fn prior_consumption_is_idempotent_even_at_zero_balance() {
        let svc = service();
        let a = account("carol");
        svc.grant(&a, 1, "pay-1", "purchase").unwrap();
        svc.consume_credit(&a, "reg-1", "registration").unwrap();
        assert_eq!(svc.balance(&a).unwrap().available_credits, 0);
        assert!(svc
            .consume_credit(&a, "reg-1", "registration")
            .unwrap()
            .is_idempotent());
    }

    #[test]
    fn grant_is_idempotent_per_payment() {
        let svc = service();
        let a = account("dan");
        svc.grant(&a, 5, "pay-1", "purchase").unwrap();
        assert!(matches!(
            svc.grant(&a, 5, "pay-1", "purchase").unwrap(),
            GrantOutcome::AlreadyApplied { .. }
        ));
        assert_eq!(svc.balance(&a).unwrap().total_credits, 5);
    }

    #[test]
    fn refund_restores_credit_once() {
        let svc = service();
        let a = account("erin");
        svc.grant(&a, 1, "pay-1", "purchase").unwrap();
        svc.consume_credit(&a, "reg-1", "registration").unwrap();

        assert!(matches!(
            svc.refund_credit(&a, "reg-1", "anchoring failed").unwrap(),
            RefundOutcome::Applied { remaining_balance: 1, .. }
        ));
        assert!(matches!(
            svc.refund_credit(&a, "reg-1", "anchoring failed").unwrap(),
            RefundOutcome::AlreadyApplied { .. }
        ));

        let row = svc.balance(&a).unwrap();
        assert_eq!((row.total_credits, row.used_credits, row.available_credits), (1, 0, 1));
    }

    #[test]
    fn refund_requires_consumption() {
        let svc = service();
        let a = account("finn");
        svc.grant(&a, 1, "pay-1", "purchase").unwrap();
        assert_eq!(
            svc.refund_credit(&a, "reg-404", "nope"),
            Err(LedgerError::ReferenceNotConsumed("reg-404".into()))
        );
    }

    #[test]
    fn expire_cannot_overdraw() {
        let svc = service();
        let a = account("gus");
        svc.grant(&a, 2, "pay-1", "purchase").unwrap();
        assert!(matches!(
            svc.expire(&a, 3, "lapsed"),
            Err(LedgerError::InsufficientBalance { available: 2, requested: 3, .. })
        ));
        svc.expire(&a, 2, "lapsed").unwrap();
        svc.adjust(&a, 1, "goodwill").unwrap();
        let row = svc.balance(&a).unwrap();
        assert_eq!((row.total_credits, row.available_credits), (1, 1));
    }

    #[test]
    fn reconcile_reports_consistent_cache() {
        let svc = service();
        let a = account("hana");
        svc.grant(&a, 2, "pay-1", "purchase").unwrap();
        let report = svc.reconcile(&a).unwrap();
        assert!(report.was_consistent);
        assert!(!report.corrected);
        assert_eq!(
            report.to_response(),
            ReconcileResponse {
                was_consistent: true,
                corrected: false
            }
        );
    }

    #[test]
    fn reconcile_repairs_drifted_cache() {
        let svc = service();
        let a = account("ivan");
        svc.grant(&a, 4, "pay-1", "purchase").unwrap();
        svc.consume_credit(&a, "reg-1", "registration").unwrap();

        let mut drifted = svc.cache().get(&a).unwrap().unwrap();
        let version = drifted.version;
        drifted.available_credits = 100;
        drifted.total_credits = 101;
        svc.cache().compare_and_swap(Some(version), drifted).unwrap();

        let mut rx = svc.events().subscribe();
        let report = svc.reconcile(&a).unwrap();
        assert!(!report.was_consistent);
        assert!(report.corrected);
        assert_eq!(report.cached_available, Some(100));
        assert_eq!(report.ledger_available, 3);
        assert_eq!(svc.balance(&a).unwrap().available_credits, 3);
        assert_eq!(rx.try_recv().unwrap().change, BalanceChange::Reconciled);

        let again = svc.reconcile(&a).unwrap();
        assert!(again.was_consistent);
    }

    #[test]
    fn missing_cache_row_is_rebuilt_on_read() {
        let ledger = Arc::new(InMemoryCreditLedger::new());
        let a = account("jude");
        ledger
            .append(&a, 0, &EntryDraft::new(CreditOperation::Add, 7, "import"), chrono::Utc::now())
            .unwrap();
        let svc = CreditAccounting::new(ledger, Arc::new(InMemoryBalanceCache::new()));
        let row = svc.balance(&a).unwrap();
        assert_eq!(row.available_credits, 7);
        assert_eq!(row.version, 1);
    }

    #[test]
    fn concurrent_consumes_on_one_account_never_overdraw() {
        let svc = Arc::new(service());
        let a = account("kim");
        svc.grant(&a, 10, "pay-1", "purchase").unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let svc = Arc::clone(&svc);
                let a = a.clone();
                std::thread::spawn(move || svc.consume_credit(&a, &format!("reg-{i}"), "registration"))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let applied = results.iter().filter(|r| matches!(r, Ok(ConsumeOutcome::Applied { .. }))).count();
        let refused = results
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::InsufficientBalance { .. })))
            .count();
        assert_eq!(applied, 10);
        assert_eq!(refused, 6);

        let row = svc.balance(&a).unwrap();
        assert_eq!(row.available_credits, 0);
        assert_eq!(row.used_credits, 10);
        assert!(svc.reconcile(&a).unwrap().was_consistent);
    }

    #[test]
    fn concurrent_duplicate_consumes_apply_once() {
        let svc = Arc::new(service());
        let a = account("lee");
        svc.grant(&a, 5, "pay-1", "purchase").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let svc = Arc::clone(&svc);
                let a = a.clone();
                std::thread::spawn(move || svc.consume_credit(&a, "reg-same", "registration").unwrap())
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(outcomes.iter().filter(|o| !o.is_idempotent()).count(), 1);
        assert_eq!(svc.balance(&a).unwrap().available_credits, 4);
    }

    #[test]
    fn reconcile_racing_consumes_loses_no_update() {
        let svc = Arc::new(service());
        let a = account("mia");
        svc.grant(&a, 20, "pay-1", "purchase").unwrap();
        let start = Arc::new(std::sync::Barrier::new(7));

        let consumers: Vec<_> = (0..4)
            .map(|t| {
                let (svc, a, start) = (Arc::clone(&svc), a.clone(), Arc::clone(&start));
                std::thread::spawn(move || {
                    start.wait();
                    (0..5)
                        .map(|i| svc.consume_credit(&a, &format!("reg-{t}-{i}"), "registration"))
                        .filter(|r| matches!(r, Ok(ConsumeOutcome::Applied { .. })))
                        .count()
                })
            })
            .collect();
        let reconcilers: Vec<_> = (0..3)
            .map(|_| {
                let (svc, a, start) = (Arc::clone(&svc), a.clone(), Arc::clone(&start));
                std::thread::spawn(move || {
                    start.wait();
                    for _ in 0..25 {
                        svc.reconcile(&a).unwrap();
                    }
                })
            })
            .collect();

        let applied: usize = consumers.into_iter().map(|h| h.join().unwrap()).sum();
        for h in reconcilers {
            h.join().unwrap();
        }

        let fold = BalanceProjection::fold(&svc.history(&a).unwrap()).unwrap();
        let row = svc.balance(&a).unwrap();
        assert_eq!(applied, 20);
        assert!(row.agrees_with(&fold));
        assert_eq!(row.used_credits, applied as u64);
        assert_eq!(row.available_credits, 0);
        assert!(svc.reconcile(&a).unwrap().was_consistent);
        assert!(svc.validate(&a).unwrap().is_valid());
    }

    #[derive(Clone, Debug)]
    enum Op {
        Grant(u64),
        Consume(u8),
        Refund(u8),
        Expire(u64),
        Adjust(u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u64..5).prop_map(Op::Grant),
            (0u8..6).prop_map(Op::Consume),
            (0u8..6).prop_map(Op::Refund),
            (1u64..3).prop_map(Op::Expire),
            (1u64..3).prop_map(Op::Adjust),
        ]
    }

    proptest! {
        #[test]
        fn cache_always_matches_ledger_fold(ops in proptest::collection::vec(op_strategy(), 0..40)) {
            let svc = service();
            let a = account("prop");
            for (i, op) in ops.iter().enumerate() {
                let _ = match op {
                    Op::Grant(n) => svc.grant(&a, *n, &format!("pay-{i}"), "grant").map(|_| ()),
                    Op::Consume(r) => svc.consume_credit(&a, &format!("reg-{r}"), "reg").map(|_| ()),
                    Op::Refund(r) => svc.refund_credit(&a, &format!("reg-{r}"), "refund").map(|_| ()),
                    Op::Expire(n) => svc.expire(&a, *n, "lapsed").map(|_| ()),
                    Op::Adjust(n) => svc.adjust(&a, *n, "fix").map(|_| ()),
                };
            }

            let entries = svc.history(&a).unwrap();
            let fold = BalanceProjection::fold(&entries).unwrap();
            let row = svc.balance(&a).unwrap();
            prop_assert!(row.agrees_with(&fold));
            prop_assert_eq!(row.total_credits, row.available_credits + row.used_credits);
            prop_assert!(svc.validate(&a).unwrap().is_valid());
        }
    }
}
