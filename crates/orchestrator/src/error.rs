//! Orchestrator error types.

use thiserror::Error;

use common::{ProviderId, SignatureStatus, SigningError};
use uuid::Uuid;
use providers::ProviderError;

/// Errors raised while coordinating providers.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// State machine or storage error.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// A provider call failed.
    #[error("provider {provider} failed: {source}")]
    Provider {
        provider: ProviderId,
        #[source]
        source: ProviderError,
    },

    /// The provider call did not finish within the configured bound.
    #[error("provider {provider} timed out after {secs}s")]
    Timeout { provider: ProviderId, secs: u64 },

    /// No provider with this id is registered.
    #[error("unknown provider: {0}")]
    UnknownProvider(ProviderId),

    /// The request already reached a provider.
    #[error("signature request {request_id} was already initiated (status {status})")]
    AlreadyInitiated {
        request_id: Uuid,
        status: SignatureStatus,
    },

    /// Selection found no live provider.
    #[error("No signature providers available")]
    NoProviderAvailable,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl OrchestratorError {
    /// Whether the failure says the provider itself is unusable.
    pub fn is_availability_failure(&self) -> bool {
        match self {
            OrchestratorError::Provider { source, .. } => source.is_availability_failure(),
            OrchestratorError::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
