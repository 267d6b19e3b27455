//! Provider-facing error type.
//!
//! Transport and parsing errors of the individual backends are converted
//! into [`ProviderError`] before they leave a provider.

use thiserror::Error;

/// Errors returned by a [`SigningProvider`](crate::SigningProvider).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The backend could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// Credentials were rejected, even after a token refresh.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The backend throttled the call.
    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    /// The backend answered with a non-success status.
    #[error("request rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The outbound payload failed validation and was not sent.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The backend answered with a body we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Key material or settings are unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Local signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Unknown envelope, job or signature.
    #[error("not found: {0}")]
    NotFound(String),

    /// The call did not complete in time.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The operation is not supported by this backend.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Errors that say the backend itself is unusable right now, as opposed
    /// to errors caused by the particular request.
    pub fn is_availability_failure(&self) -> bool {
        matches!(
            self,
            ProviderError::Network(_) | ProviderError::Timeout(_) | ProviderError::Authentication(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_classification() {
        assert!(ProviderError::Network("down".into()).is_availability_failure());
        assert!(ProviderError::Timeout("slow".into()).is_availability_failure());
        assert!(ProviderError::Authentication("bad secret".into()).is_availability_failure());

        assert!(!ProviderError::Rejected {
            status: 400,
            message: "bad payload".into()
        }
        .is_availability_failure());
        assert!(!ProviderError::RateLimited { retry_after: Some(3) }.is_availability_failure());
        assert!(!ProviderError::Signing("key".into()).is_availability_failure());
    }
}
