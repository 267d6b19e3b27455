//! Signature sessions: one record per attempt against one provider.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provider::ProviderId;
use crate::request::{SignatureRequest, SignatureStatus, Signatory};
use crate::DEFAULT_SESSION_TTL_DAYS;

/// Coordination record binding a request to a provider attempt.
///
/// Sessions are superseded, never reused: a failover opens a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureSession {
    pub session_id: Uuid,
    pub request_id: Uuid,
    pub provider: ProviderId,
    /// Mirror of the provider-side status.
    pub status: SignatureStatus,
    pub correlation_id: Option<String>,
    pub participants: Vec<Signatory>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set when the provider call for this attempt failed.
    pub failure: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SignatureSession {
    /// Open a draft session for `request` against `provider`.
    pub fn open(request: &SignatureRequest, provider: ProviderId) -> Self {
        Self::open_with_ttl(request, provider, Duration::days(DEFAULT_SESSION_TTL_DAYS))
    }

    pub fn open_with_ttl(request: &SignatureRequest, provider: ProviderId, ttl: Duration) -> Self {
        let now = Utc::now();
        let mut metadata = serde_json::Map::new();
        metadata.insert("provider".to_string(), provider.as_str().into());
        metadata.insert("request_id".to_string(), request.id.to_string().into());

        Self {
            session_id: Uuid::new_v4(),
            request_id: request.id,
            provider,
            status: SignatureStatus::Draft,
            correlation_id: None,
            participants: request.signatories.clone(),
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
            failure: None,
            metadata,
        }
    }

    /// Whether the reconciliation sweep should poll this session.
    pub fn needs_reconciliation(&self) -> bool {
        self.correlation_id.is_some() && SignatureStatus::IN_FLIGHT.contains(&self.status)
    }
}
