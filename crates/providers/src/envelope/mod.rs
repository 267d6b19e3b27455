//! Remote envelope-based e-signature provider.
//!
//! The provider talks to a REST API shaped after the common hosted
//! e-signature services: an account-scoped `envelopes` collection, OAuth
//! client-credentials authentication, and webhook notifications on status
//! changes.

pub mod auth;
pub mod payload;
pub mod status;
pub mod webhook;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use common::{ProviderId, SignatureRequest, SignatureStatus, SigningDocument};

use crate::error::ProviderError;
use crate::{JobMetadata, SigningJob, SigningProvider, VerificationTarget};

use auth::TokenCache;
use payload::{EnvelopeDefinition, Recipients, Signer};
pub use status::map_envelope_status;
pub use webhook::{parse_webhook, WebhookNotice};

/// Default provider id for the envelope backend.
pub const ENVELOPE_PROVIDER_ID: &str = "envelope";

fn default_provider_id() -> String {
    ENVELOPE_PROVIDER_ID.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Connection settings for the envelope service.
#[derive(Clone, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    pub account_id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// REST base, e.g. `https://demo.example-sign.net`.
    pub base_path: String,
    /// OAuth server base, e.g. `https://account-d.example-sign.net`.
    pub auth_server: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl fmt::Debug for EnvelopeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeConfig")
            .field("provider_id", &self.provider_id)
            .field("account_id", &self.account_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("base_path", &self.base_path)
            .field("auth_server", &self.auth_server)
            .finish()
    }
}

/// Response to envelope creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeSummary {
    pub envelope_id: String,
    pub status: String,
    #[serde(default)]
    pub status_date_time: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

/// Envelope as returned by a status lookup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub envelope_id: String,
    pub status: String,
    #[serde(default)]
    pub status_changed_date_time: Option<String>,
    #[serde(default)]
    pub completed_date_time: Option<String>,
    #[serde(default)]
    pub voided_reason: Option<String>,
}

/// Per-recipient progress as reported by the service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientStatus {
    pub recipient_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub routing_order: Option<String>,
    #[serde(default)]
    pub signed_date_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeRecipients {
    #[serde(default)]
    pub signers: Vec<RecipientStatus>,
}

/// Client for the remote envelope service.
pub struct RemoteEnvelopeProvider {
    id: ProviderId,
    config: EnvelopeConfig,
    client: reqwest::Client,
    tokens: TokenCache,
}

impl RemoteEnvelopeProvider {
    pub fn new(config: EnvelopeConfig) -> Result<Self, ProviderError> {
        for (name, value) in [
            ("account_id", &config.account_id),
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
            ("base_path", &config.base_path),
            ("auth_server", &config.auth_server),
        ] {
            if value.trim().is_empty() {
                return Err(ProviderError::Configuration(format!(
                    "envelope provider: {} is empty",
                    name
                )));
            }
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProviderError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        let tokens = TokenCache::new(&config.auth_server, &config.client_id, &config.client_secret);

        info!(
            provider = %config.provider_id,
            base_path = %config.base_path,
            "Envelope provider configured"
        );

        Ok(Self {
            id: ProviderId::new(config.provider_id.clone()),
            config,
            client,
            tokens,
        })
    }

    fn account_url(&self) -> String {
        format!(
            "{}/restapi/v2.1/accounts/{}",
            self.config.base_path.trim_end_matches('/'),
            self.config.account_id
        )
    }

    fn envelope_url(&self, envelope_id: &str) -> String {
        format!("{}/envelopes/{}", self.account_url(), envelope_id)
    }

    /// Send an authorized request. A 401 triggers exactly one token refresh
    /// and one resend.
    async fn send<F>(&self, method: Method, url: &str, build: F) -> Result<Response, ProviderError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let token = self.tokens.token(&self.client).await?;
        let resp = build(self.client.request(method.clone(), url).bearer_auth(&token))
            .send()
            .await?;

        let resp = if resp.status() == StatusCode::UNAUTHORIZED {
            debug!(url, "Access token rejected, refreshing once");
            let token = self.tokens.refresh(&self.client).await?;
            let retried = build(self.client.request(method, url).bearer_auth(&token))
                .send()
                .await?;
            if retried.status() == StatusCode::UNAUTHORIZED {
                return Err(ProviderError::Authentication(
                    "request unauthorized after token refresh".into(),
                ));
            }
            retried
        } else {
            resp
        };

        Self::check_status(resp).await
    }

    async fn check_status(resp: Response) -> Result<Response, ProviderError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            warn!(?retry_after, "Envelope service rate limit hit");
            return Err(ProviderError::RateLimited { retry_after });
        }

        let message = resp.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(message));
        }
        Err(ProviderError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: for<'de> Deserialize<'de>>(resp: Response) -> Result<T, ProviderError> {
        resp.json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    /// Create and send an envelope.
    pub async fn create_envelope(
        &self,
        definition: &EnvelopeDefinition,
    ) -> Result<EnvelopeSummary, ProviderError> {
        definition.validate()?;
        let url = format!("{}/envelopes", self.account_url());
        let resp = self.send(Method::POST, &url, |b| b.json(definition)).await?;
        let summary: EnvelopeSummary = Self::json(resp).await?;

        info!(
            envelope_id = %summary.envelope_id,
            status = %summary.status,
            signers = definition.recipients.signers.len(),
            "Envelope created"
        );
        Ok(summary)
    }

    pub async fn get_envelope(&self, envelope_id: &str) -> Result<Envelope, ProviderError> {
        let resp = self
            .send(Method::GET, &self.envelope_url(envelope_id), |b| b)
            .await?;
        Self::json(resp).await
    }

    /// Download all documents of an envelope as one combined file.
    pub async fn download_documents(&self, envelope_id: &str) -> Result<Vec<u8>, ProviderError> {
        let url = format!("{}/documents/combined", self.envelope_url(envelope_id));
        let resp = self.send(Method::GET, &url, |b| b).await?;
        let bytes = resp.bytes().await?;
        Ok(bytes.to_vec())
    }

    pub async fn list_recipients(
        &self,
        envelope_id: &str,
    ) -> Result<Vec<RecipientStatus>, ProviderError> {
        let url = format!("{}/recipients", self.envelope_url(envelope_id));
        let resp = self.send(Method::GET, &url, |b| b).await?;
        let recipients: EnvelopeRecipients = Self::json(resp).await?;
        Ok(recipients.signers)
    }

    /// Void an in-flight envelope.
    pub async fn void_envelope(&self, envelope_id: &str, reason: &str) -> Result<(), ProviderError> {
        let body = serde_json::json!({ "status": "voided", "voidedReason": reason });
        self.send(Method::PUT, &self.envelope_url(envelope_id), |b| b.json(&body))
            .await?;
        info!(envelope_id, reason, "Envelope voided");
        Ok(())
    }

    /// Resend the envelope notification to the given recipient ids.
    pub async fn send_reminders(
        &self,
        envelope_id: &str,
        recipient_ids: &[String],
    ) -> Result<usize, ProviderError> {
        let signers: Vec<Signer> = self
            .list_recipients(envelope_id)
            .await?
            .into_iter()
            .filter(|r| recipient_ids.contains(&r.recipient_id))
            .map(|r| Signer {
                email: r.email,
                name: r.name,
                routing_order: r.routing_order.unwrap_or_else(|| "1".to_string()),
                recipient_id: r.recipient_id,
                tabs: Default::default(),
            })
            .collect();

        if signers.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "no matching recipients on envelope {}",
                envelope_id
            )));
        }

        let count = signers.len();
        let body = Recipients { signers };
        let url = format!("{}/recipients", self.envelope_url(envelope_id));
        self.send(Method::PUT, &url, |b| {
            b.query(&[("resend_envelope", "true")]).json(&body)
        })
        .await?;

        info!(envelope_id, count, "Envelope reminders sent");
        Ok(count)
    }

    /// True when every signer on the envelope has completed.
    pub async fn verify_envelope(&self, envelope_id: &str) -> Result<bool, ProviderError> {
        let signers = self.list_recipients(envelope_id).await?;
        Ok(!signers.is_empty()
            && signers
                .iter()
                .all(|s| s.status.eq_ignore_ascii_case("completed")))
    }
}

#[async_trait]
impl SigningProvider for RemoteEnvelopeProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn create_signing_job(
        &self,
        request: &SignatureRequest,
        document: &SigningDocument,
        metadata: &JobMetadata,
    ) -> Result<SigningJob, ProviderError> {
        let definition = EnvelopeDefinition::from_request(
            request,
            document,
            metadata.subject.as_deref(),
            metadata.message.as_deref(),
        )?;
        let summary = self.create_envelope(&definition).await?;

        Ok(SigningJob {
            status: map_envelope_status(&summary.status),
            correlation_id: summary.envelope_id,
            evidence: Vec::new(),
            artifacts: Vec::new(),
        })
    }

    async fn get_status(&self, correlation_id: &str) -> Result<SignatureStatus, ProviderError> {
        let envelope = self.get_envelope(correlation_id).await?;
        Ok(map_envelope_status(&envelope.status))
    }

    async fn verify(
        &self,
        target: &VerificationTarget,
        _document: &SigningDocument,
    ) -> Result<bool, ProviderError> {
        match target {
            VerificationTarget::Correlation(envelope_id) => self.verify_envelope(envelope_id).await,
            VerificationTarget::Artifact(_) => Err(ProviderError::Unsupported(
                "envelope provider verifies by envelope id only".into(),
            )),
        }
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = self.account_url();
        self.send(Method::GET, &url, |b| b).await?;
        Ok(true)
    }
}
