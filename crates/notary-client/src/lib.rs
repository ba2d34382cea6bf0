//! Client side of Notary.
//!
//! - [`StatusPoller`] watches one registration until it reaches a terminal
//!   state, the local wait limit passes, or the caller cancels. It never
//!   writes server state.
//! - [`HttpStatusSource`] talks to the Notary HTTP API.
//! - [`CachedBalance`] is a read-through balance view with a staleness
//!   window.

pub mod balance;
pub mod error;
pub mod poller;
pub mod source;

pub use balance::{BalanceSource, CachedBalance, DEFAULT_BALANCE_STALENESS};
pub use error::ClientError;
pub use poller::{
    PollConfig, PollHandle, PollOutcome, PollProgress, StatusPoller, DEFAULT_MAX_WAIT,
    DEFAULT_POLL_INTERVAL,
};
pub use source::{HttpStatusSource, StatusSource};
