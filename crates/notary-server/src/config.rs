use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use notary_anchor::{PipelineConfig, DEFAULT_ANCHORING_TIMEOUT};
use notary_crypto::{SigningKey, VerifyingKey};
use notary_verify::{VerifierConfig, DEFAULT_LEGAL_NOTICE};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Server configuration, read from TOML. Durations are in seconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub pipeline: PipelineSection,
    pub calendar: CalendarSection,
    pub credits: CreditsSection,
    pub verify: VerifySection,
    pub client: ClientSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8417)),
            pipeline: PipelineSection::default(),
            calendar: CalendarSection::default(),
            credits: CreditsSection::default(),
            verify: VerifySection::default(),
            client: ClientSection::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub anchoring_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub refund_on_failure: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            anchoring_timeout_secs: DEFAULT_ANCHORING_TIMEOUT.as_secs(),
            sweep_interval_secs: 30,
            refund_on_failure: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSection {
    pub name: String,
    /// Hex Ed25519 secret. A fresh key is generated when absent, which
    /// makes earlier attestations unverifiable against a pinned key.
    pub signing_key: Option<String>,
    pub seal_interval_secs: u64,
    pub required_confirmations: u32,
}

impl Default for CalendarSection {
    fn default() -> Self {
        Self {
            name: "local-calendar".into(),
            signing_key: None,
            seal_interval_secs: 10,
            required_confirmations: 1,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditsSection {
    /// Credits granted to an account the first time it authenticates.
    pub welcome_grant: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifySection {
    /// Extra calendar keys (hex) to accept besides the server's own.
    pub trusted_calendar_keys: Vec<String>,
    pub legal_notice: Option<String>,
    /// Upper bound on a `POST /verify` body (content plus proof file).
    pub max_upload_bytes: usize,
}

impl Default for VerifySection {
    fn default() -> Self {
        Self {
            trusted_calendar_keys: Vec::new(),
            legal_notice: Some(DEFAULT_LEGAL_NOTICE.to_string()),
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Advertised polling policy for clients, served by `/v1/info`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3,
            max_wait_secs: 5 * 60,
        }
    }
}

impl ServerConfig {
    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.pipeline.anchoring_timeout_secs <= self.client.max_wait_secs {
            return Err(ServerError::Config(format!(
                "pipeline.anchoring_timeout_secs ({}) must exceed client.max_wait_secs ({})",
                self.pipeline.anchoring_timeout_secs, self.client.max_wait_secs
            )));
        }
        if self.pipeline.sweep_interval_secs == 0 || self.calendar.seal_interval_secs == 0 {
            return Err(ServerError::Config("intervals must be at least one second".into()));
        }
        if self.client.poll_interval_secs == 0 {
            return Err(ServerError::Config("client.poll_interval_secs must be positive".into()));
        }
        if self.calendar.required_confirmations == 0 {
            return Err(ServerError::Config(
                "calendar.required_confirmations must be at least 1".into(),
            ));
        }
        self.signing_key()?;
        self.trusted_keys()?;
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            anchoring_timeout: Duration::from_secs(self.pipeline.anchoring_timeout_secs),
            refund_on_failure: self.pipeline.refund_on_failure,
        }
    }

    /// Verifier policy. `own_key` is the local calendar's key, always trusted.
    pub fn verifier_config(&self, own_key: VerifyingKey) -> ServerResult<VerifierConfig> {
        let mut keys = self.trusted_keys()?;
        if !keys.contains(&own_key) {
            keys.push(own_key);
        }
        Ok(VerifierConfig {
            trusted_calendar_keys: keys,
            legal_notice: self.verify.legal_notice.clone(),
        })
    }

    pub fn signing_key(&self) -> ServerResult<Option<SigningKey>> {
        self.calendar
            .signing_key
            .as_deref()
            .map(|hex| {
                SigningKey::from_hex(hex)
                    .map_err(|e| ServerError::Config(format!("calendar.signing_key: {e}")))
            })
            .transpose()
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.pipeline.sweep_interval_secs)
    }

    pub fn seal_interval(&self) -> Duration {
        Duration::from_secs(self.calendar.seal_interval_secs)
    }

    fn trusted_keys(&self) -> ServerResult<Vec<VerifyingKey>> {
        self.verify
            .trusted_calendar_keys
            .iter()
            .map(|hex| {
                VerifyingKey::from_hex(hex)
                    .map_err(|e| ServerError::Config(format!("verify.trusted_calendar_keys: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8417".parse::<SocketAddr>().unwrap());
        assert_eq!(c.pipeline.anchoring_timeout_secs, 24 * 60 * 60);
        assert_eq!(c.pipeline.sweep_interval_secs, 30);
        assert_eq!(c.calendar.seal_interval_secs, 10);
        assert_eq!(c.client.poll_interval_secs, 3);
        assert_eq!(c.client.max_wait_secs, 300);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: ServerConfig = toml::from_str(
            r#"
            bind_addr = "0.0.0.0:9000"

            [pipeline]
            anchoring_timeout_secs = 3600

            [credits]
            welcome_grant = 5
            "#,
        )
        .unwrap();
        assert_eq!(c.bind_addr.port(), 9000);
        assert_eq!(c.pipeline.anchoring_timeout_secs, 3600);
        assert_eq!(c.pipeline.sweep_interval_secs, 30);
        assert_eq!(c.credits.welcome_grant, 5);
        assert_eq!(c.calendar.name, "local-calendar");
    }

    #[test]
    fn pipeline_timeout_must_outlast_client_window() {
        let mut c = ServerConfig::default();
        c.pipeline.anchoring_timeout_secs = 60;
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("must exceed client.max_wait_secs"));
    }

    #[test]
    fn bad_signing_key_is_rejected() {
        let mut c = ServerConfig::default();
        c.calendar.signing_key = Some("not-hex".into());
        assert!(matches!(c.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn own_key_is_always_trusted() {
        let key = SigningKey::from_bytes([3; 32]).verifying_key();
        let verifier = ServerConfig::default().verifier_config(key.clone()).unwrap();
        assert_eq!(verifier.trusted_calendar_keys, vec![key]);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[calendar]\nrequired_confirmations = 2").unwrap();
        let c = ServerConfig::load(file.path()).unwrap();
        assert_eq!(c.calendar.required_confirmations, 2);
    }
}
