//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use common::SigningError;
use orchestrator::OrchestratorError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn error_type(&self) -> &str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::InternalError(_) => "internal_error",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Signing(SigningError::NotFound(what)) | OrchestratorError::NotFound(what) => {
                ApiError::NotFound(what)
            }
            OrchestratorError::Signing(
                e @ (SigningError::InvalidRequest(_) | SigningError::InvalidTransition { .. }),
            ) => ApiError::BadRequest(e.to_string()),
            e @ OrchestratorError::AlreadyInitiated { .. } => ApiError::BadRequest(e.to_string()),
            OrchestratorError::UnknownProvider(id) => {
                ApiError::NotFound(format!("provider {}", id))
            }
            e @ (OrchestratorError::NoProviderAvailable
            | OrchestratorError::Timeout { .. }
            | OrchestratorError::Provider { .. }) => ApiError::ServiceUnavailable(e.to_string()),
            e => ApiError::InternalError(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProviderId;

    #[test]
    fn test_orchestrator_errors_map_to_status_codes() {
        let cases = [
            (OrchestratorError::NotFound("request x".into()), StatusCode::NOT_FOUND),
            (
                OrchestratorError::Signing(SigningError::InvalidRequest("bad".into())),
                StatusCode::BAD_REQUEST,
            ),
            (OrchestratorError::NoProviderAvailable, StatusCode::SERVICE_UNAVAILABLE),
            (
                OrchestratorError::UnknownProvider(ProviderId::new("ghost")),
                StatusCode::NOT_FOUND,
            ),
            (
                OrchestratorError::Signing(SigningError::Storage("disk full".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }
}
