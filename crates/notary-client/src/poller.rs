//! Registration status polling.
//!
//! The poller only reads. Its wait limit is local and advisory: when it
//! expires the caller gets `PollOutcome::TimedOut` while the server keeps
//! its own, longer deadline and may still confirm the registration.

use std::sync::Arc;
use std::time::Duration;

use notary_types::api::RegistrationStatusResponse;
use notary_types::{RegistrationId, RegistrationStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::source::StatusSource;

/// Default interval between status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default local wait limit.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

/// Observed progress, published on every successful query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollProgress {
    pub status: Option<RegistrationStatus>,
    /// 0–100. FAILED keeps the last value shown.
    pub percent: u8,
    pub error_message: Option<String>,
}

/// How polling ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// A terminal state was observed.
    Finished(RegistrationStatusResponse),
    /// The local wait limit passed. Not a failure of the registration.
    TimedOut { last: Option<RegistrationStatusResponse> },
    /// The caller stopped watching.
    Cancelled { last: Option<RegistrationStatusResponse> },
}

impl PollOutcome {
    pub fn last_status(&self) -> Option<RegistrationStatus> {
        match self {
            Self::Finished(r) => Some(r.status),
            Self::TimedOut { last } | Self::Cancelled { last } => last.as_ref().map(|r| r.status),
        }
    }

    /// Text for the person waiting on the registration.
    pub fn user_message(&self) -> String {
        match self {
            Self::Finished(r) if r.status == RegistrationStatus::Confirmed => {
                "Registration confirmed. Your certificate is ready.".to_string()
            }
            Self::Finished(r) => format!(
                "Registration failed: {}. You can retry the registration.",
                r.error_message.as_deref().unwrap_or("no reason given")
            ),
            Self::TimedOut { .. } => {
                "Still working on it. Anchoring can take a while; check back later.".to_string()
            }
            Self::Cancelled { .. } => {
                "Stopped watching. The registration continues in the background.".to_string()
            }
        }
    }
}

/// Spawns polling tasks against a status source.
#[derive(Clone)]
pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    config: PollConfig,
}

impl StatusPoller {
    pub fn new(source: Arc<dyn StatusSource>, config: PollConfig) -> Self {
        Self { source, config }
    }

    /// Start watching `id` on the current tokio runtime.
    pub fn spawn(&self, id: RegistrationId) -> PollHandle {
        let (progress_tx, progress_rx) = watch::channel(PollProgress::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(poll_until_settled(
            Arc::clone(&self.source),
            id,
            self.config,
            progress_tx,
            cancel_rx,
        ));
        PollHandle {
            progress: progress_rx,
            cancel: cancel_tx,
            task: Some(task),
        }
    }

    /// Watch `id` to completion on the calling task.
    pub async fn watch(&self, id: RegistrationId) -> PollOutcome {
        self.spawn(id).wait().await
    }
}

/// Handle to a running poll. Dropping it stops the poll.
pub struct PollHandle {
    progress: watch::Receiver<PollProgress>,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<PollOutcome>>,
}

impl PollHandle {
    /// Latest progress snapshot.
    pub fn progress(&self) -> PollProgress {
        self.progress.borrow().clone()
    }

    /// Receiver for progress changes.
    pub fn subscribe(&self) -> watch::Receiver<PollProgress> {
        self.progress.clone()
    }

    /// Ask the poll to stop. `wait` then returns `Cancelled`.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub async fn wait(mut self) -> PollOutcome {
        let Some(task) = self.task.take() else {
            return PollOutcome::Cancelled { last: None };
        };
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "status poll task ended abnormally");
                PollOutcome::Cancelled { last: None }
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn poll_until_settled(
    source: Arc<dyn StatusSource>,
    id: RegistrationId,
    config: PollConfig,
    progress: watch::Sender<PollProgress>,
    mut cancel: watch::Receiver<bool>,
) -> PollOutcome {
    let deadline = Instant::now() + config.max_wait;
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<RegistrationStatusResponse> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => return PollOutcome::Cancelled { last },
            _ = tokio::time::sleep_until(deadline) => {
                debug!(registration = %id, "local wait limit reached");
                return PollOutcome::TimedOut { last };
            }
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.changed() => return PollOutcome::Cancelled { last },
            _ = tokio::time::sleep_until(deadline) => return PollOutcome::TimedOut { last },
            fetched = source.fetch_status(&id) => fetched,
        };

        match fetched {
            Ok(response) => {
                progress.send_modify(|p| {
                    p.status = Some(response.status);
                    if let Some(percent) = response.status.progress() {
                        p.percent = percent;
                    }
                    p.error_message = response.error_message.clone();
                });
                if response.status.is_terminal() {
                    return PollOutcome::Finished(response);
                }
                last = Some(response);
            }
            Err(e) => {
                warn!(registration = %id, error = %e, "status query failed; will retry");
            }
        }
    }
}
