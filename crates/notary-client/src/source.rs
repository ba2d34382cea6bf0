use std::time::Duration;

use async_trait::async_trait;
use notary_types::api::{BalanceResponse, RegistrationStatusResponse};
use notary_types::RegistrationId;
use notary_verify::VerificationResult;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::balance::BalanceSource;
use crate::error::ClientError;

/// Read-only source of registration state.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, id: &RegistrationId) -> Result<RegistrationStatusResponse, ClientError>;
}

/// HTTP access to a Notary server.
#[derive(Clone, Debug)]
pub struct HttpStatusSource {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    calendar_key: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl HttpStatusSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(3))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Bearer token sent as the authenticated principal.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /verify?fingerprint=`.
    pub async fn verify_fingerprint(&self, fingerprint: &str) -> Result<VerificationResult, ClientError> {
        let request = self
            .client
            .get(format!("{}/verify", self.base_url))
            .query(&[("fingerprint", fingerprint)]);
        self.send(request).await
    }

    /// Hex public key of the server's anchoring calendar, from `GET /v1/info`.
    pub async fn calendar_key(&self) -> Result<String, ClientError> {
        let request = self.client.get(format!("{}/v1/info", self.base_url));
        let info: ServerInfo = self.send(request).await?;
        Ok(info.calendar_key)
    }

    async fn send<R: DeserializeOwned>(&self, request: RequestBuilder) -> Result<R, ClientError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                ClientError::Connection(self.base_url.clone())
            } else {
                ClientError::Http(e)
            }
        })?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            let (code, message) = match serde_json::from_slice::<ErrorEnvelope>(&body) {
                Ok(envelope) => (envelope.error.code, envelope.error.message),
                Err(_) => (
                    status.canonical_reason().unwrap_or("error").to_string(),
                    String::from_utf8_lossy(&body).into_owned(),
                ),
            };
            return Err(ClientError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }
        serde_json::from_slice(&body).map_err(|e| ClientError::Parse(e.to_string()))
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch_status(&self, id: &RegistrationId) -> Result<RegistrationStatusResponse, ClientError> {
        let request = self
            .client
            .get(format!("{}/registration-status", self.base_url))
            .query(&[("id", id.to_string())]);
        self.send(request).await
    }
}

#[async_trait]
impl BalanceSource for HttpStatusSource {
    async fn fetch_balance(&self) -> Result<BalanceResponse, ClientError> {
        let request = self.client.get(format!("{}/credits/balance", self.base_url));
        self.send(request).await
    }
}
