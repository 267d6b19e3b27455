//! Shared types for the signature orchestration workspace.
//!
//! This crate holds the data model that every other crate speaks:
//! signature requests and their status state machine, signatories,
//! sessions, provider availability records, the audit trail, and the
//! record store that persists requests and sessions.

pub mod audit;
pub mod provider;
pub mod request;
pub mod session;
pub mod storage;

pub use audit::{AuditEntry, AuditEvent, AuditTrail};
pub use provider::{ProviderId, ProviderStatus};
pub use request::{
    SignatoryEvidence, SignatureEvidence, SignatureRequest, SignatureStatus, Signatory,
    SignatoryStatus, SigningDocument, WorkflowMode,
};
pub use session::SignatureSession;
pub use storage::{SignatureStore, SqliteSignatureStore};

/// Default lifetime of a signature session (days).
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

/// Default lifetime of a signature request when the caller does not set one (days).
pub const DEFAULT_REQUEST_TTL_DAYS: i64 = 30;

/// Error type shared by the data model and the record store.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: SignatureStatus,
        to: SignatureStatus,
    },

    #[error("invalid signature request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for SigningError {
    fn from(err: serde_json::Error) -> Self {
        SigningError::Serialization(err.to_string())
    }
}
