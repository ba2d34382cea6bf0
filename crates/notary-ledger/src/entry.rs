use chrono::{DateTime, Utc};
use notary_crypto::{ChainLink, HashChainVerifier};
use notary_types::{AccountId, CreditOperation, LedgerEntryId};
use serde::{Deserialize, Serialize};

/// Business object a ledger entry refers to, e.g. `("registration", id)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub kind: String,
    pub id: String,
}

impl Reference {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn registration(id: impl ToString) -> Self {
        Self::new("registration", id.to_string())
    }

    pub fn payment(id: impl Into<String>) -> Self {
        Self::new("payment", id)
    }
}

/// Caller-supplied part of a ledger entry. The ledger fills in sequence,
/// resulting balance, timestamp, and hash links.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryDraft {
    pub operation: CreditOperation,
    pub amount: u64,
    pub reason: String,
    pub reference: Option<Reference>,
}

impl EntryDraft {
    pub fn new(operation: CreditOperation, amount: u64, reason: impl Into<String>) -> Self {
        Self {
            operation,
            amount,
            reason: reason.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }
}

/// Immutable credit ledger record.
///
/// `seq` is 1-based and gap-free per account. `balance_after` is the
/// account's available balance once this entry is applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub account_id: AccountId,
    pub seq: u64,
    pub operation: CreditOperation,
    pub amount: u64,
    pub balance_after: u64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
    pub created_at: DateTime<Utc>,
    pub prev_hash: Option<[u8; 32]>,
    pub entry_hash: [u8; 32],
}

/// Fields covered by the entry hash.
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    id: &'a LedgerEntryId,
    account_id: &'a AccountId,
    seq: u64,
    operation: CreditOperation,
    amount: u64,
    balance_after: u64,
    reason: &'a str,
    reference: &'a Option<Reference>,
    created_at_ms: i64,
}

impl LedgerEntry {
    /// Seal a draft into the entry that follows `prev` (or the first entry
    /// of the account when `prev` is `None`).
    pub(crate) fn seal(
        account: &AccountId,
        prev: Option<&LedgerEntry>,
        draft: &EntryDraft,
        balance_after: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut entry = Self {
            id: LedgerEntryId::new(),
            account_id: account.clone(),
            seq: prev.map_or(1, |p| p.seq + 1),
            operation: draft.operation,
            amount: draft.amount,
            balance_after,
            reason: draft.reason.clone(),
            reference: draft.reference.clone(),
            created_at,
            prev_hash: prev.map(|p| p.entry_hash),
            entry_hash: [0; 32],
        };
        entry.entry_hash = HashChainVerifier::compute_hash(&entry.payload_bytes(), entry.prev_hash);
        entry
    }

    pub fn reference_id(&self) -> Option<&str> {
        self.reference.as_ref().map(|r| r.id.as_str())
    }

    /// `true` if this entry is the `operation` recorded for `reference_id`.
    pub fn matches(&self, operation: CreditOperation, reference_id: &str) -> bool {
        self.operation == operation && self.reference_id() == Some(reference_id)
    }
}

impl ChainLink for LedgerEntry {
    fn entry_hash(&self) -> [u8; 32] {
        self.entry_hash
    }

    fn prev_hash(&self) -> Option<[u8; 32]> {
        self.prev_hash
    }

    fn payload_bytes(&self) -> Vec<u8> {
        let canonical = CanonicalEntry {
            id: &self.id,
            account_id: &self.account_id,
            seq: self.seq,
            operation: self.operation,
            amount: self.amount,
            balance_after: self.balance_after,
            reason: &self.reason,
            reference: &self.reference,
            created_at_ms: self.created_at.timestamp_millis(),
        };
        // Plain field types; serialization cannot fail. An empty payload
        // would surface as a hash mismatch during validation.
        serde_json::to_vec(&canonical).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> AccountId {
        AccountId::new("acct-1").unwrap()
    }

    #[test]
    fn sealed_entries_form_a_chain() {
        let now = Utc::now();
        let first = LedgerEntry::seal(
            &account(),
            None,
            &EntryDraft::new(CreditOperation::Add, 5, "purchase"),
            5,
            now,
        );
        let second = LedgerEntry::seal(
            &account(),
            Some(&first),
            &EntryDraft::new(CreditOperation::Consume, 1, "registration")
                .with_reference(Reference::registration("r-1")),
            4,
            now,
        );

        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(second.prev_hash, Some(first.entry_hash));
        assert!(HashChainVerifier::verify_chain(&[first, second]).is_ok());
    }

    #[test]
    fn tampered_amount_breaks_hash() {
        let mut entry = LedgerEntry::seal(
            &account(),
            None,
            &EntryDraft::new(CreditOperation::Add, 5, "purchase"),
            5,
            Utc::now(),
        );
        entry.amount = 500;
        assert!(HashChainVerifier::verify_chain(&[entry]).is_err());
    }

    #[test]
    fn matches_operation_and_reference() {
        let entry = LedgerEntry::seal(
            &account(),
            None,
            &EntryDraft::new(CreditOperation::Add, 1, "grant")
                .with_reference(Reference::payment("pay-9")),
            1,
            Utc::now(),
        );
        assert!(entry.matches(CreditOperation::Add, "pay-9"));
        assert!(!entry.matches(CreditOperation::Consume, "pay-9"));
        assert!(!entry.matches(CreditOperation::Add, "pay-8"));
    }

    #[test]
    fn serializes_camel_case() {
        let entry = LedgerEntry::seal(
            &account(),
            None,
            &EntryDraft::new(CreditOperation::Add, 3, "purchase"),
            3,
            Utc::now(),
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["balanceAfter"], 3);
        assert_eq!(json["operation"], "ADD");
        assert!(json.get("reference").is_none());
    }
}
