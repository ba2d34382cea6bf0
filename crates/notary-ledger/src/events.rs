use notary_types::{AccountId, CreditOperation};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// What moved a balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BalanceChange {
    Entry { operation: CreditOperation, seq: u64 },
    Reconciled,
}

/// Notification published after the balance cache is written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceEvent {
    pub account_id: AccountId,
    pub available_credits: u64,
    pub version: u64,
    pub change: BalanceChange,
}

/// Broadcast fan-out for balance changes.
///
/// Subscribers that fall behind lose the oldest events; the cache stays the
/// place to read the current balance.
#[derive(Clone, Debug)]
pub struct BalanceEvents {
    sender: broadcast::Sender<BalanceEvent>,
}

impl BalanceEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BalanceEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: BalanceEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BalanceEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
