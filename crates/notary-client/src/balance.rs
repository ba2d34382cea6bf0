//! Read-through balance cache for display.
//!
//! The server's ledger is authoritative; this cache only spares repeated
//! round trips while a screen is open. Anything that spends credits goes
//! through the server and should `invalidate` afterwards.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use notary_types::api::BalanceResponse;
use tokio::time::Instant;
use tracing::debug;

use crate::error::ClientError;

/// How long a fetched balance is served without asking again.
pub const DEFAULT_BALANCE_STALENESS: Duration = Duration::from_secs(30);

#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn fetch_balance(&self) -> Result<BalanceResponse, ClientError>;
}

pub struct CachedBalance {
    source: Arc<dyn BalanceSource>,
    staleness: Duration,
    cached: Mutex<Option<(Instant, BalanceResponse)>>,
}

impl CachedBalance {
    pub fn new(source: Arc<dyn BalanceSource>) -> Self {
        Self::with_staleness(source, DEFAULT_BALANCE_STALENESS)
    }

    pub fn with_staleness(source: Arc<dyn BalanceSource>, staleness: Duration) -> Self {
        Self {
            source,
            staleness,
            cached: Mutex::new(None),
        }
    }

    /// Cached balance if still fresh, otherwise a fresh fetch.
    pub async fn get(&self) -> Result<BalanceResponse, ClientError> {
        if let Some(balance) = self.fresh() {
            return Ok(balance);
        }
        self.refresh().await
    }

    /// Fetch unconditionally and replace the cached value.
    ///
    /// A response older than the cached one (lower version) is discarded
    /// in favour of what is already held.
    pub async fn refresh(&self) -> Result<BalanceResponse, ClientError> {
        let fetched = self.source.fetch_balance().await?;
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        let keep = match cached.as_ref() {
            Some((_, held)) if held.version > fetched.version => {
                debug!(held = held.version, fetched = fetched.version, "ignoring older balance");
                held.clone()
            }
            _ => fetched,
        };
        *cached = Some((Instant::now(), keep.clone()));
        Ok(keep)
    }

    pub fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Whatever is held, fresh or not, without fetching.
    pub fn peek(&self) -> Option<BalanceResponse> {
        self.cached
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|(_, b)| b.clone())
    }

    fn fresh(&self) -> Option<BalanceResponse> {
        let cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        match cached.as_ref() {
            Some((at, balance)) if at.elapsed() < self.staleness => Some(balance.clone()),
            _ => None,
        }
    }
}
