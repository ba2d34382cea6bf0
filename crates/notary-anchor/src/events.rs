use chrono::{DateTime, Utc};
use notary_types::{AccountId, RegistrationId, RegistrationStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An applied registration state change. `from` is `None` on creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationEvent {
    pub registration_id: RegistrationId,
    pub owner_id: AccountId,
    pub from: Option<RegistrationStatus>,
    pub to: RegistrationStatus,
    pub at: DateTime<Utc>,
}

/// Broadcast fan-out for registration changes.
#[derive(Clone, Debug)]
pub struct RegistrationEvents {
    sender: broadcast::Sender<RegistrationEvent>,
}

impl RegistrationEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistrationEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: RegistrationEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for RegistrationEvents {
    fn default() -> Self {
        Self::new(1024)
    }
}
