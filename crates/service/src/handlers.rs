//! HTTP handlers.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use common::{ProviderId, ProviderStatus, SignatureRequest, SignatureSession};
use orchestrator::{metrics, SignatureOrchestrator, SyncReport, WebhookOutcome};

use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SignatureOrchestrator>,
    /// Provider that envelope webhooks belong to, if configured.
    pub envelope_provider: Option<ProviderId>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/providers/status", get(provider_status))
        .route("/requests/{request_id}", get(get_request))
        .route("/sync", post(trigger_sync))
        .route("/webhooks/envelope", post(envelope_webhook))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub version: String,
    pub providers_available: usize,
    pub providers_total: usize,
}

/// GET /health
///
/// `degraded` when no provider is currently available.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let statuses = state.orchestrator.provider_status().await;
    let available = statuses.iter().filter(|s| s.is_available).count();

    Json(HealthResponse {
        status: if available > 0 { "healthy" } else { "degraded" }.to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        providers_available: available,
        providers_total: statuses.len(),
    })
}

/// GET /providers/status
pub async fn provider_status(State(state): State<AppState>) -> Json<Vec<ProviderStatus>> {
    Json(state.orchestrator.provider_status().await)
}

#[derive(Debug, Serialize)]
pub struct RequestView {
    pub request: SignatureRequest,
    pub sessions: Vec<SignatureSession>,
}

/// GET /requests/{request_id}
pub async fn get_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<RequestView>> {
    let request = state
        .orchestrator
        .get_request(request_id)?
        .ok_or_else(|| ApiError::NotFound(format!("signature request {}", request_id)))?;
    let sessions = state.orchestrator.sessions_for_request(request_id)?;
    Ok(Json(RequestView { request, sessions }))
}

/// POST /sync - run one reconciliation pass now
pub async fn trigger_sync(State(state): State<AppState>) -> ApiResult<Json<SyncReport>> {
    info!("Manual status synchronization requested");
    Ok(Json(state.orchestrator.synchronize_status().await?))
}

/// POST /webhooks/envelope
///
/// Always answers 200 once the envelope provider is configured, so the
/// sender does not redeliver events we chose to ignore.
pub async fn envelope_webhook(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<WebhookOutcome>> {
    let provider = state
        .envelope_provider
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("envelope provider is not configured".into()))?;

    let outcome = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(payload) => state.orchestrator.apply_webhook_event(provider, &payload).await,
        Err(e) => {
            debug!("Unparseable webhook body: {}", e);
            WebhookOutcome::Ignored {
                reason: "malformed payload".into(),
            }
        }
    };
    Ok(Json(outcome))
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn metrics_handler() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_text(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use common::{Signatory, SignatureStatus, SigningDocument, SqliteSignatureStore, WorkflowMode};
    use orchestrator::OrchestratorConfig;
    use providers::pki::authority::LocalAuthority;
    use providers::pki::{DigestAlgorithm, LocalSigningProvider, RevokedSerials};
    use providers::SigningProvider;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn state(envelope_provider: Option<ProviderId>) -> AppState {
        let ca = LocalAuthority::generate("Service CA").unwrap();
        let issued = ca.issue("service-signer").unwrap();
        let pki = LocalSigningProvider::from_pem(
            ProviderId::new("pki"),
            &issued.key_pem,
            &issued.cert_pem,
            &ca.cert_pem(),
            DigestAlgorithm::Sha256,
            Arc::new(RevokedSerials::new()),
        )
        .unwrap();

        let orchestrator = SignatureOrchestrator::new(
            OrchestratorConfig::default().with_default_provider("pki"),
            vec![Arc::new(pki) as Arc<dyn SigningProvider>],
            Arc::new(SqliteSignatureStore::open_in_memory().unwrap()),
        )
        .unwrap();

        AppState {
            orchestrator: Arc::new(orchestrator),
            envelope_provider,
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_reflects_probes() {
        let state = state(None).await;
        let (status, body) = send(router(state.clone()), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");

        state.orchestrator.monitor().probe_all().await;
        let (_, body) = send(router(state.clone()), get("/health")).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["providers_available"], 1);

        let (_, body) = send(router(state), get("/providers/status")).await;
        assert_eq!(body[0]["provider"], "pki");
        assert_eq!(body[0]["is_available"], true);
    }

    #[tokio::test]
    async fn test_get_request_returns_sessions() {
        let state = state(None).await;
        state.orchestrator.monitor().probe_all().await;

        let request = SignatureRequest::new(
            "doc-9",
            None,
            vec![Signatory::new("a@example.org", 1)],
            WorkflowMode::Parallel,
        )
        .unwrap();
        let id = request.id;
        let result = state
            .orchestrator
            .initiate_signature(request, &SigningDocument::new("doc.pdf", b"body".to_vec()), None)
            .await;
        assert_eq!(result.status, SignatureStatus::Completed);

        let (status, body) = send(router(state.clone()), get(&format!("/requests/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["request"]["status"], "completed");
        assert_eq!(body["sessions"].as_array().unwrap().len(), 1);

        let (status, body) = send(router(state), get(&format!("/requests/{}", Uuid::new_v4()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "not_found");
    }

    #[tokio::test]
    async fn test_webhook_endpoint() {
        let post = |body: &'static str| {
            Request::builder()
                .method("POST")
                .uri("/webhooks/envelope")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap()
        };

        let (status, _) = send(router(state(None).await), post("{}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let app = router(state(Some(ProviderId::new("envelope"))).await);
        let (status, body) = send(app.clone(), post("not json")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "outcome": "ignored", "reason": "malformed payload" }));

        let (status, body) = send(
            app,
            post(r#"{"event":"envelope-completed","data":{"envelopeId":"env-404"}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "ignored");
        assert_eq!(body["reason"], "unknown envelope");
    }

    #[tokio::test]
    async fn test_sync_and_metrics() {
        let state = state(None).await;
        let request = Request::builder()
            .method("POST")
            .uri("/sync")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(router(state.clone()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checked"], 0);

        state.orchestrator.monitor().probe_all().await;
        let response = router(state).oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&text).contains("signature_provider_available"));
    }
}
