use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Lifecycle state of a registration.
///
/// ```text
/// PENDING ──▶ PROCESSING ──┬──▶ CONFIRMED
///                          └──▶ FAILED
/// ```
///
/// `Confirmed` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    /// Created and paid for, not yet handed to the anchoring network.
    Pending,
    /// Submitted to the anchoring network, awaiting confirmation.
    Processing,
    /// Anchored; an `AnchoringProof` exists.
    Confirmed,
    /// Anchoring failed or timed out; `errorMessage` is set.
    Failed,
}

impl RegistrationStatus {
    /// Position in the lifecycle order. Terminal states share the top rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Confirmed | Self::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    /// Whether `self → next` is a legal single-step transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Confirmed)
                | (Self::Processing, Self::Failed)
        )
    }

    /// Progress on a 0–100 scale. `Failed` has no progress of its own; the
    /// observer keeps whatever value it last displayed.
    pub fn progress(self) -> Option<u8> {
        match self {
            Self::Pending => Some(10),
            Self::Processing => Some(50),
            Self::Confirmed => Some(100),
            Self::Failed => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Confirmed => "CONFIRMED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "CONFIRMED" => Ok(Self::Confirmed),
            "FAILED" => Ok(Self::Failed),
            other => Err(TypeError::UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use RegistrationStatus::*;

    const ALL: [RegistrationStatus; 4] = [Pending, Processing, Confirmed, Failed];

    #[test]
    fn only_three_transitions_are_legal() {
        let legal: Vec<_> = ALL
            .iter()
            .flat_map(|a| ALL.iter().map(move |b| (*a, *b)))
            .filter(|(a, b)| a.can_transition_to(*b))
            .collect();
        assert_eq!(
            legal,
            vec![(Pending, Processing), (Processing, Confirmed), (Processing, Failed)]
        );
    }

    #[test]
    fn legal_transitions_increase_rank() {
        for a in ALL {
            for b in ALL {
                if a.can_transition_to(b) {
                    assert!(b.rank() > a.rank());
                }
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [Confirmed, Failed] {
            assert!(terminal.is_terminal());
            assert!(ALL.iter().all(|next| !terminal.can_transition_to(*next)));
        }
    }

    #[test]
    fn progress_mapping() {
        assert_eq!(Pending.progress(), Some(10));
        assert_eq!(Processing.progress(), Some(50));
        assert_eq!(Confirmed.progress(), Some(100));
        assert_eq!(Failed.progress(), None);
    }

    #[test]
    fn wire_format_is_screaming_case() {
        assert_eq!(serde_json::to_string(&Processing).unwrap(), "\"PROCESSING\"");
        let parsed: RegistrationStatus = serde_json::from_str("\"CONFIRMED\"").unwrap();
        assert_eq!(parsed, Confirmed);
        assert_eq!("FAILED".parse::<RegistrationStatus>().unwrap(), Failed);
        assert!("DONE".parse::<RegistrationStatus>().is_err());
    }
}
