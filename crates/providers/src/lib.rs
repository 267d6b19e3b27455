//! Signing backends behind a common [`SigningProvider`] contract.
//!
//! Two backends ship with the workspace:
//! - [`envelope::RemoteEnvelopeProvider`]: a hosted e-signature service that
//!   collects signatures through envelopes sent to each signatory
//! - [`pki::LocalSigningProvider`]: detached Ed25519 signatures produced
//!   with a locally held key and certificate
//!
//! Backend-specific operations (void, reminders, CSR generation, ...) are
//! inherent methods on the concrete types.

pub mod envelope;
pub mod error;
pub mod pki;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use common::{ProviderId, SignatoryEvidence, SignatureRequest, SignatureStatus, SigningDocument};

pub use error::ProviderError;

/// Context handed to a provider alongside the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMetadata {
    pub session_id: Option<uuid::Uuid>,
    /// Subject line / display text for the signing job.
    pub subject: Option<String>,
    pub message: Option<String>,
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningJob {
    /// Envelope id or local signature reference.
    pub correlation_id: String,
    /// Status of the job right after submission.
    pub status: SignatureStatus,
    /// Evidence produced synchronously (local signing only).
    pub evidence: Vec<SignatoryEvidence>,
    /// Serialized signature artifacts to keep with the session. Each one
    /// verifies through [`VerificationTarget::Artifact`].
    #[serde(default)]
    pub artifacts: Vec<serde_json::Value>,
}

/// What to verify.
#[derive(Debug, Clone)]
pub enum VerificationTarget {
    /// A job previously created by the provider.
    Correlation(String),
    /// A serialized signature artifact produced by the provider.
    Artifact(serde_json::Value),
}

/// Contract every signing backend implements.
#[async_trait]
pub trait SigningProvider: Send + Sync {
    fn id(&self) -> &ProviderId;

    /// Submit a request for signing.
    async fn create_signing_job(
        &self,
        request: &SignatureRequest,
        document: &SigningDocument,
        metadata: &JobMetadata,
    ) -> Result<SigningJob, ProviderError>;

    /// Current status of a job, in the shared status vocabulary.
    async fn get_status(&self, correlation_id: &str) -> Result<SignatureStatus, ProviderError>;

    /// Whether the signature(s) identified by `target` are valid for `document`.
    async fn verify(
        &self,
        target: &VerificationTarget,
        document: &SigningDocument,
    ) -> Result<bool, ProviderError>;

    /// Cheap liveness probe. Never mutates a job.
    async fn health_check(&self) -> Result<bool, ProviderError>;
}
