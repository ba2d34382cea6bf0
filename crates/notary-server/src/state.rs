use std::sync::Arc;

use notary_anchor::{AnchoringPipeline, InMemoryRegistrationStore, LocalCalendar};
use notary_crypto::SigningKey;
use notary_ledger::{CreditAccounting, GrantOutcome, InMemoryBalanceCache, InMemoryCreditLedger};
use notary_types::{Clock, SystemClock};
use notary_verify::ProofVerifier;
use tracing::{info, warn};

use crate::auth::{AuthProvider, BearerAuth, Identity};
use crate::config::ServerConfig;
use crate::error::ServerResult;

/// Shared handles for request handlers and background tasks.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    config: ServerConfig,
    accounting: CreditAccounting,
    pipeline: AnchoringPipeline,
    calendar: Arc<LocalCalendar>,
    verifier: ProofVerifier,
    auth: Arc<dyn AuthProvider>,
}

impl AppState {
    /// Wire in-memory backends from configuration.
    pub fn from_config(config: ServerConfig) -> ServerResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ServerConfig, clock: Arc<dyn Clock>) -> ServerResult<Self> {
        config.validate()?;

        let key = match config.signing_key()? {
            Some(key) => key,
            None => {
                warn!("no calendar.signing_key configured; generating an ephemeral key");
                SigningKey::generate()
            }
        };
        let calendar = Arc::new(
            LocalCalendar::new(config.calendar.name.clone(), key)
                .with_clock(clock.clone())
                .with_required_confirmations(config.calendar.required_confirmations),
        );
        info!(
            calendar = %config.calendar.name,
            key = %calendar.verifying_key().to_hex(),
            "anchoring calendar ready"
        );

        let accounting = CreditAccounting::new(
            Arc::new(InMemoryCreditLedger::new()),
            Arc::new(InMemoryBalanceCache::new()),
        )
        .with_clock(clock.clone());

        let store = Arc::new(InMemoryRegistrationStore::new());
        let pipeline = AnchoringPipeline::new(
            store.clone(),
            Arc::new(accounting.clone()),
            calendar.clone(),
            config.pipeline_config(),
        )
        .with_clock(clock);

        let verifier = ProofVerifier::new(store, config.verifier_config(calendar.verifying_key())?);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                accounting,
                pipeline,
                calendar,
                verifier,
                auth: Arc::new(BearerAuth),
            }),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn accounting(&self) -> &CreditAccounting {
        &self.inner.accounting
    }

    pub fn pipeline(&self) -> &AnchoringPipeline {
        &self.inner.pipeline
    }

    pub fn calendar(&self) -> &Arc<LocalCalendar> {
        &self.inner.calendar
    }

    pub fn verifier(&self) -> &ProofVerifier {
        &self.inner.verifier
    }

    pub fn auth(&self) -> &dyn AuthProvider {
        self.inner.auth.as_ref()
    }

    /// Hand out the configured welcome grant, once per account.
    pub(crate) fn on_authenticated(&self, identity: &Identity) {
        let amount = self.inner.config.credits.welcome_grant;
        if amount == 0 || identity.is_admin {
            return;
        }
        let reference = format!("welcome:{}", identity.account);
        match self
            .inner
            .accounting
            .grant(&identity.account, amount, &reference, "welcome grant")
        {
            Ok(GrantOutcome::Applied { .. }) => {
                info!(account = %identity.account, amount, "welcome credits granted");
            }
            Ok(GrantOutcome::AlreadyApplied { .. }) => {}
            Err(e) => warn!(account = %identity.account, error = %e, "welcome grant failed"),
        }
    }
}
