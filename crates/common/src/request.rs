//! Signature requests, signatories and the status state machine.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditTrail};
use crate::provider::ProviderId;
use crate::{SigningError, DEFAULT_REQUEST_TTL_DAYS};

/// Lifecycle status of a signature request (and of the sessions mirroring it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureStatus {
    Draft,
    Sent,
    Viewed,
    Signed,
    Completed,
    Declined,
    Expired,
}

impl SignatureStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [SignatureStatus; 7] = [
        SignatureStatus::Draft,
        SignatureStatus::Sent,
        SignatureStatus::Viewed,
        SignatureStatus::Signed,
        SignatureStatus::Completed,
        SignatureStatus::Declined,
        SignatureStatus::Expired,
    ];

    /// Statuses that a reconciliation sweep polls: submitted to a provider
    /// but not yet settled.
    pub const IN_FLIGHT: [SignatureStatus; 3] = [
        SignatureStatus::Sent,
        SignatureStatus::Viewed,
        SignatureStatus::Signed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Viewed => "viewed",
            Self::Signed => "signed",
            Self::Completed => "completed",
            Self::Declined => "declined",
            Self::Expired => "expired",
        }
    }

    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Declined | Self::Expired)
    }

    /// The transition table. Anything not listed here is rejected.
    pub fn allowed_targets(&self) -> &'static [SignatureStatus] {
        use SignatureStatus::*;
        match self {
            Draft => &[Sent, Completed, Declined, Expired],
            Sent => &[Viewed, Signed, Completed, Declined, Expired],
            Viewed => &[Signed, Completed, Declined, Expired],
            Signed => &[Completed, Declined, Expired],
            Completed | Declined | Expired => &[],
        }
    }

    /// Whether `self -> to` appears in the transition table.
    pub fn can_transition(&self, to: SignatureStatus) -> bool {
        self.allowed_targets().contains(&to)
    }
}

impl fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureStatus {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignatureStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| SigningError::Serialization(format!("unknown signature status '{}'", s)))
    }
}

/// How signatories are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    /// Everyone may sign at once.
    #[default]
    Parallel,
    /// Signatories sign one after another, by `order`.
    Sequential,
}

/// Per-signatory progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignatoryStatus {
    #[default]
    Pending,
    Signed,
    Declined,
}

/// Evidence captured when a signatory signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEvidence {
    pub signed_at: DateTime<Utc>,
    /// Network origin of the signing action (IP address, or a backend label
    /// for signatures produced server-side).
    pub origin_address: Option<String>,
    /// Provider-specific signature payload (base64 for local signatures).
    pub signature_data: Option<String>,
}

/// Evidence for a specific party, as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatoryEvidence {
    pub party_id: String,
    pub evidence: SignatureEvidence,
}

/// A party expected to sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signatory {
    /// Stable contact reference. Doubles as display name and email address
    /// for envelope providers.
    pub party_id: String,
    /// Position in the signing order (1-based).
    pub order: u32,
    #[serde(default)]
    pub status: SignatoryStatus,
    #[serde(default)]
    pub evidence: Option<SignatureEvidence>,
}

impl Signatory {
    pub fn new(party_id: impl Into<String>, order: u32) -> Self {
        Self {
            party_id: party_id.into(),
            order,
            status: SignatoryStatus::Pending,
            evidence: None,
        }
    }
}

/// Document bytes plus the display name used by providers.
#[derive(Debug, Clone)]
pub struct SigningDocument {
    pub name: String,
    pub content: Vec<u8>,
}

impl SigningDocument {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A request to collect signatures on one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub id: Uuid,
    pub document_id: String,
    /// Parent agreement (MoU) the document belongs to.
    pub mou_id: Option<String>,
    /// Provider chosen for the current attempt.
    pub provider: Option<ProviderId>,
    pub status: SignatureStatus,
    pub signatories: Vec<Signatory>,
    pub workflow: WorkflowMode,
    /// Envelope id or certificate reference returned by the provider.
    pub correlation_id: Option<String>,
    pub audit_trail: AuditTrail,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SignatureRequest {
    /// Create a draft request. Fails if the signatory list breaks the
    /// ordering invariant of the chosen workflow.
    pub fn new(
        document_id: impl Into<String>,
        mou_id: Option<String>,
        signatories: Vec<Signatory>,
        workflow: WorkflowMode,
    ) -> Result<Self, SigningError> {
        let now = Utc::now();
        let mut request = Self {
            id: Uuid::new_v4(),
            document_id: document_id.into(),
            mou_id,
            provider: None,
            status: SignatureStatus::Draft,
            signatories,
            workflow,
            correlation_id: None,
            audit_trail: AuditTrail::new(),
            expires_at: now + Duration::days(DEFAULT_REQUEST_TTL_DAYS),
            created_at: now,
            completed_at: None,
        };
        request.validate()?;
        request.audit_trail.record(
            AuditEvent::RequestCreated,
            None,
            json!({
                "document_id": request.document_id,
                "workflow": request.workflow,
                "signatories": request.signatories.len(),
            }),
        );
        Ok(request)
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), SigningError> {
        if self.workflow == WorkflowMode::Sequential {
            let mut seen = HashSet::with_capacity(self.signatories.len());
            for signatory in &self.signatories {
                if !seen.insert(signatory.order) {
                    return Err(SigningError::InvalidRequest(format!(
                        "duplicate signing order {} in sequential workflow",
                        signatory.order
                    )));
                }
            }
        }
        Ok(())
    }

    /// Apply a status transition. Rejected transitions leave the request
    /// (including its audit trail) untouched.
    pub fn transition_to(
        &mut self,
        to: SignatureStatus,
        actor: Option<&str>,
        details: serde_json::Value,
    ) -> Result<(), SigningError> {
        let from = self.status;
        if !from.can_transition(to) {
            return Err(SigningError::InvalidTransition { from, to });
        }

        self.status = to;
        if to == SignatureStatus::Completed {
            self.completed_at = Some(Utc::now());
        }

        let mut payload = json!({ "from": from, "to": to });
        if let (Some(map), serde_json::Value::Object(extra)) = (payload.as_object_mut(), details) {
            map.extend(extra);
        }
        self.audit_trail
            .record(AuditEvent::StatusChanged, actor, payload);
        Ok(())
    }

    /// Attach evidence to the named signatory and mark it signed.
    ///
    /// Returns `false` if no signatory with that party id exists.
    pub fn record_signature(&mut self, party_id: &str, evidence: SignatureEvidence) -> bool {
        match self.signatories.iter_mut().find(|s| s.party_id == party_id) {
            Some(signatory) => {
                signatory.status = SignatoryStatus::Signed;
                signatory.evidence = Some(evidence);
                true
            }
            None => false,
        }
    }

    /// Share of signatories that have signed, rounded to the nearest percent.
    pub fn completion_percentage(&self) -> u8 {
        let total = self.signatories.len();
        if total == 0 {
            return 0;
        }
        let signed = self
            .signatories
            .iter()
            .filter(|s| s.status == SignatoryStatus::Signed)
            .count();
        ((100.0 * signed as f64) / total as f64).round() as u8
    }
}
