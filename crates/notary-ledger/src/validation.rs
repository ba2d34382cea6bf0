use std::collections::HashSet;

use notary_crypto::{ChainLink, HashChainVerifier};
use notary_types::{AccountId, CreditOperation};

use crate::entry::LedgerEntry;

/// Result of account stream validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    pub account_id: AccountId,
    pub entry_count: u64,
    pub hash_chain_valid: bool,
    pub sequence_gap_free: bool,
    pub balances_consistent: bool,
    pub references_unique: bool,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific integrity violation detected during validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub seq: u64,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    ForeignEntry,
    SequenceGap,
    HashChainBreak,
    HashMismatch,
    BalanceMismatch,
    NegativeBalance,
    DuplicateReference,
    UnmatchedRefund,
}

/// Credit ledger stream validator.
pub struct StreamValidator;

impl StreamValidator {
    /// Validate one account's entries for every ledger invariant.
    pub fn validate(account: &AccountId, entries: &[LedgerEntry]) -> ValidationReport {
        let mut violations = Vec::new();
        let mut hash_chain_valid = true;
        let mut sequence_gap_free = true;
        let mut balances_consistent = true;
        let mut references_unique = true;
        let mut seen_references: HashSet<(CreditOperation, &str)> = HashSet::new();
        let mut balance: u64 = 0;

        for (index, entry) in entries.iter().enumerate() {
            let mut flag = |kind: ViolationKind, description: String| {
                violations.push(Violation {
                    seq: entry.seq,
                    kind,
                    description,
                });
            };

            if entry.account_id != *account {
                flag(
                    ViolationKind::ForeignEntry,
                    format!("entry belongs to {}", entry.account_id),
                );
            }

            let expected_seq = (index + 1) as u64;
            if entry.seq != expected_seq {
                sequence_gap_free = false;
                flag(
                    ViolationKind::SequenceGap,
                    format!("expected seq {expected_seq}, got {}", entry.seq),
                );
            }

            let expected_prev = index.checked_sub(1).map(|i| entries[i].entry_hash);
            if entry.prev_hash != expected_prev {
                hash_chain_valid = false;
                flag(ViolationKind::HashChainBreak, "previous hash link mismatch".into());
            }

            let computed = HashChainVerifier::compute_hash(&entry.payload_bytes(), entry.prev_hash);
            if computed != entry.entry_hash {
                hash_chain_valid = false;
                flag(
                    ViolationKind::HashMismatch,
                    "entry hash does not match computed".into(),
                );
            }

            match entry.operation.apply(balance, entry.amount) {
                Some(next) => {
                    if next != entry.balance_after {
                        balances_consistent = false;
                        flag(
                            ViolationKind::BalanceMismatch,
                            format!("balance_after {} but running balance is {next}", entry.balance_after),
                        );
                    }
                    balance = next;
                }
                None => {
                    balances_consistent = false;
                    flag(
                        ViolationKind::NegativeBalance,
                        format!("{} of {} from balance {balance}", entry.operation, entry.amount),
                    );
                    balance = entry.balance_after;
                }
            }

            if let Some(reference_id) = entry.reference_id() {
                if !seen_references.insert((entry.operation, reference_id)) {
                    references_unique = false;
                    flag(
                        ViolationKind::DuplicateReference,
                        format!("second {} for reference {reference_id}", entry.operation),
                    );
                }
                if entry.operation == CreditOperation::Refund
                    && !seen_references.contains(&(CreditOperation::Consume, reference_id))
                {
                    flag(
                        ViolationKind::UnmatchedRefund,
                        format!("refund for {reference_id} has no prior consumption"),
                    );
                }
            }
        }

        ValidationReport {
            account_id: account.clone(),
            entry_count: entries.len() as u64,
            hash_chain_valid,
            sequence_gap_free,
            balances_consistent,
            references_unique,
            violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryDraft, Reference};
    use crate::memory::InMemoryCreditLedger;
    use crate::traits::CreditLedger;
    use chrono::Utc;

    fn populated() -> (AccountId, Vec<LedgerEntry>) {
        let ledger = InMemoryCreditLedger::new();
        let a = AccountId::new("acct").unwrap();
        let drafts = [
            EntryDraft::new(CreditOperation::Add, 3, "purchase"),
            EntryDraft::new(CreditOperation::Consume, 1, "registration")
                .with_reference(Reference::registration("r-1")),
            EntryDraft::new(CreditOperation::Refund, 1, "failed")
                .with_reference(Reference::registration("r-1")),
        ];
        for (i, draft) in drafts.iter().enumerate() {
            ledger.append(&a, i as u64, draft, Utc::now()).unwrap();
        }
        let entries = ledger.entries(&a).unwrap();
        (a, entries)
    }

    #[test]
    fn valid_stream() {
        let (a, entries) = populated();
        let report = StreamValidator::validate(&a, &entries);
        assert!(report.is_valid(), "{:?}", report.violations);
        assert_eq!(report.entry_count, 3);
    }

    #[test]
    fn empty_stream_is_valid() {
        let a = AccountId::new("acct").unwrap();
        assert!(StreamValidator::validate(&a, &[]).is_valid());
    }

    #[test]
    fn detects_tampered_amount() {
        let (a, mut entries) = populated();
        entries[0].amount = 30;
        let report = StreamValidator::validate(&a, &entries);
        assert!(!report.hash_chain_valid);
        assert!(!report.balances_consistent);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::HashMismatch && v.seq == 1));
    }

    #[test]
    fn detects_removed_entry() {
        let (a, mut entries) = populated();
        entries.remove(1);
        let report = StreamValidator::validate(&a, &entries);
        assert!(!report.sequence_gap_free);
        assert!(!report.hash_chain_valid);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::UnmatchedRefund));
    }

    #[test]
    fn detects_duplicate_reference() {
        let (a, mut entries) = populated();
        let dup = entries[1].clone();
        entries.push(dup);
        let report = StreamValidator::validate(&a, &entries);
        assert!(!report.references_unique);
    }

    #[test]
    fn detects_foreign_entry() {
        let (_, entries) = populated();
        let other = AccountId::new("someone-else").unwrap();
        let report = StreamValidator::validate(&other, &entries);
        assert_eq!(
            report
                .violations
                .iter()
                .filter(|v| v.kind == ViolationKind::ForeignEntry)
                .count(),
            3
        );
    }
}
