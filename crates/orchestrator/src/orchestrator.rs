//! Signature orchestration: selection, sessions, failover and reconciliation.
//!
//! ## Initiation flow
//!
//! ```text
//! select provider ──> open session ──> create_signing_job ──> success
//!        ^                                    │
//!        │                                    v failure
//!        └──── fallback configured, ─────── record failure
//!              available and not yet
//!              tried (once)
//! ```
//!
//! Every operation on a request holds that request's async lock, so an
//! initiation, a reconciliation pass and a webhook never interleave on the
//! same request.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use common::{
    AuditEvent, ProviderId, ProviderStatus, SignatoryEvidence, SignatoryStatus, SignatureRequest,
    SignatureSession, SignatureStatus, SignatureStore, SigningDocument,
};
use providers::envelope::parse_webhook;
use providers::{JobMetadata, ProviderError, SigningJob, SigningProvider, VerificationTarget};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::health::{ProviderHealthMonitor, ProviderSet};
use crate::metrics;
use crate::selection::{select_provider, SelectionPolicy};
use crate::task::PeriodicTask;

/// Actor recorded on audit entries written by the orchestrator itself.
pub const SYSTEM_ACTOR: &str = "orchestrator";

/// Session metadata key holding the provider's signature artifacts.
pub const ARTIFACTS_KEY: &str = "artifacts";

/// Outcome of one initiation.
#[derive(Debug, Clone, Serialize)]
pub struct SignatureResult {
    pub success: bool,
    pub request_id: Uuid,
    pub session_id: Option<Uuid>,
    /// Envelope id or local job reference.
    pub signature_id: Option<String>,
    /// Provider of the last attempt, if any was made.
    pub provider: Option<ProviderId>,
    pub status: SignatureStatus,
    pub error: Option<String>,
    pub metadata: serde_json::Map<String, Value>,
}

impl SignatureResult {
    fn failure(request: &SignatureRequest, provider: Option<ProviderId>, error: String) -> Self {
        Self {
            success: false,
            request_id: request.id,
            session_id: None,
            signature_id: None,
            provider,
            status: request.status,
            error: Some(error),
            metadata: serde_json::Map::new(),
        }
    }
}

/// One entry of a mixed-provider batch.
#[derive(Debug, Clone)]
pub struct MixedSigningItem {
    pub request: SignatureRequest,
    pub provider: ProviderId,
    pub document: SigningDocument,
}

/// Counters of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub checked: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Remote status could not be applied through the transition table.
    pub rejected: usize,
    pub failed: usize,
}

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied {
        session_id: Uuid,
        from: SignatureStatus,
        to: SignatureStatus,
    },
    /// Envelope status unchanged; signatories newly marked signed.
    EvidenceRecorded {
        session_id: Uuid,
        signatures: usize,
    },
    Unchanged,
    Ignored {
        reason: String,
    },
}

/// Result of applying a remote status to a session.
enum Reconciled {
    Updated {
        session_id: Uuid,
        from: SignatureStatus,
        to: SignatureStatus,
    },
    /// Status unchanged, but new signer evidence was stored.
    EvidenceRecorded { session_id: Uuid, signatures: usize },
    Unchanged,
    Rejected,
}

fn sync_source(event: AuditEvent) -> &'static str {
    match event {
        AuditEvent::WebhookReceived => "webhook",
        _ => "poll",
    }
}

/// Why an attempt failed, and whether failing over makes sense.
struct AttemptFailure {
    error: OrchestratorError,
    /// False once the provider accepted the job: a second provider would
    /// produce a duplicate.
    failover_allowed: bool,
}

/// Coordinates providers, sessions and request state.
pub struct SignatureOrchestrator {
    config: OrchestratorConfig,
    providers: Arc<ProviderSet>,
    monitor: Arc<ProviderHealthMonitor>,
    store: Arc<dyn SignatureStore>,
    request_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    sync_task: Mutex<Option<PeriodicTask>>,
}

impl SignatureOrchestrator {
    /// Build an orchestrator over `providers`.
    ///
    /// Fails if two providers share an id, if the configured default or
    /// fallback provider is not registered, or if an interval or timeout is
    /// zero.
    pub fn new(
        config: OrchestratorConfig,
        providers: Vec<Arc<dyn SigningProvider>>,
        store: Arc<dyn SignatureStore>,
    ) -> Result<Self> {
        let mut set = ProviderSet::new();
        for provider in providers {
            let id = provider.id().clone();
            if set.insert(id.clone(), provider).is_some() {
                return Err(OrchestratorError::Configuration(format!(
                    "provider {} registered twice",
                    id
                )));
            }
        }

        if set.is_empty() {
            return Err(OrchestratorError::Configuration(
                "no signing providers configured".into(),
            ));
        }
        for (role, id) in [
            ("default", Some(&config.default_provider)),
            ("fallback", config.fallback_provider.as_ref()),
        ] {
            if let Some(id) = id.filter(|id| !set.contains_key(*id)) {
                return Err(OrchestratorError::Configuration(format!(
                    "{} provider {} is not registered",
                    role, id
                )));
            }
        }

        for (name, secs) in [
            ("health_check_interval_secs", config.health_check_interval_secs),
            ("sync_interval_secs", config.sync_interval_secs),
            ("probe_timeout_secs", config.probe_timeout_secs),
            ("provider_timeout_secs", config.provider_timeout_secs),
        ] {
            if secs == 0 {
                return Err(OrchestratorError::Configuration(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        let providers = Arc::new(set);
        let monitor = Arc::new(ProviderHealthMonitor::new(
            providers.clone(),
            config.health_check_interval(),
            config.probe_timeout(),
        ));

        info!(
            providers = ?providers.keys().map(ProviderId::as_str).collect::<Vec<_>>(),
            default = %config.default_provider,
            fallback = ?config.fallback_provider.as_ref().map(ProviderId::as_str),
            "Signature orchestrator configured"
        );

        Ok(Self {
            config,
            providers,
            monitor,
            store,
            request_locks: Mutex::new(HashMap::new()),
            sync_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<ProviderHealthMonitor> {
        &self.monitor
    }

    pub fn provider(&self, id: &ProviderId) -> Option<&Arc<dyn SigningProvider>> {
        self.providers.get(id)
    }

    /// Start the health and reconciliation loops.
    pub async fn start(self: &Arc<Self>) {
        self.monitor.start().await;

        let mut task = self.sync_task.lock().await;
        if task.as_ref().is_some_and(|t| t.is_running()) {
            return;
        }
        let orchestrator: Weak<Self> = Arc::downgrade(self);
        *task = Some(PeriodicTask::spawn(
            "status-sync",
            self.config.sync_interval(),
            move || {
                let orchestrator = orchestrator.clone();
                async move {
                    if let Some(orchestrator) = orchestrator.upgrade() {
                        if let Err(e) = orchestrator.synchronize_status().await {
                            error!("Status synchronization failed: {}", e);
                        }
                    }
                }
            },
        ));
    }

    /// Stop both loops and wait for them.
    pub async fn stop(&self) {
        if let Some(task) = self.sync_task.lock().await.take() {
            task.stop().await;
        }
        self.monitor.stop().await;
    }

    async fn lock_request(&self, request_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.request_locks.lock().await;
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry(request_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    async fn call_provider<T, F>(&self, provider: &ProviderId, call: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, ProviderError>>,
    {
        let timeout = self.config.provider_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(OrchestratorError::Provider {
                provider: provider.clone(),
                source,
            }),
            Err(_) => Err(OrchestratorError::Timeout {
                provider: provider.clone(),
                secs: timeout.as_secs(),
            }),
        }
    }

    /// Route `request` to a live provider, failing over once if configured.
    ///
    /// A request id that is already stored continues from the stored copy,
    /// and only while it has never reached a provider. Never returns an
    /// error: failures are reported in the result.
    pub async fn initiate_signature(
        &self,
        request: SignatureRequest,
        document: &SigningDocument,
        preferred: Option<&ProviderId>,
    ) -> SignatureResult {
        let _guard = self.lock_request(request.id).await;

        let mut request = match self.admit(request) {
            Ok(request) => request,
            Err((request, e)) => {
                error!(request_id = %request.id, "Signature request refused: {}", e);
                return SignatureResult::failure(&request, None, e.to_string());
            }
        };

        let mut preferred = preferred.cloned();
        let mut excluded = BTreeSet::new();
        let mut failed_over = false;

        loop {
            let availability = self.monitor.availability().await;
            let policy = SelectionPolicy {
                preferred: preferred.as_ref(),
                default: Some(&self.config.default_provider),
                fallback: self.config.fallback_provider.as_ref(),
                excluded: excluded.clone(),
            };

            let Some(provider_id) = select_provider(&availability, &policy) else {
                warn!(request_id = %request.id, "No signature providers available");
                return SignatureResult::failure(
                    &request,
                    None,
                    OrchestratorError::NoProviderAvailable.to_string(),
                );
            };

            let (session_id, failure) = match self.attempt(&mut request, &provider_id, document).await {
                Ok(result) => return result,
                Err(failed) => failed,
            };

            let message = failure.error.to_string();
            if failure.error.is_availability_failure() {
                self.monitor.report_failure(&provider_id, &message).await;
            }

            let fallback = match self.config.fallback_provider.as_ref() {
                Some(fb) if failure.failover_allowed && !failed_over && *fb != provider_id => {
                    if self.monitor.is_available(fb).await {
                        Some(fb.clone())
                    } else {
                        warn!(
                            request_id = %request.id,
                            fallback = %fb,
                            "Fallback provider unavailable, not failing over"
                        );
                        None
                    }
                }
                _ => None,
            };

            let Some(fallback) = fallback else {
                let mut result = SignatureResult::failure(&request, Some(provider_id), message);
                result.session_id = session_id;
                return result;
            };

            warn!(
                request_id = %request.id,
                from = %provider_id,
                to = %fallback,
                "Signature attempt failed, failing over: {}",
                message
            );
            request.audit_trail.record(
                AuditEvent::FailoverTriggered,
                Some(SYSTEM_ACTOR),
                json!({
                    "from": provider_id,
                    "to": fallback,
                    "error": message,
                }),
            );
            self.persist_request(&request);
            metrics::record_failover(provider_id.as_str(), fallback.as_str());

            failed_over = true;
            excluded.insert(provider_id);
            preferred = Some(fallback);
        }
    }

    /// Validate and persist a request about to be initiated.
    ///
    /// An id that is already stored resumes from the stored record so its
    /// audit trail keeps growing. Stored requests past `draft` or bound to a
    /// provider job are refused.
    fn admit(
        &self,
        request: SignatureRequest,
    ) -> std::result::Result<SignatureRequest, (SignatureRequest, OrchestratorError)> {
        if let Err(e) = request.validate() {
            return Err((request, e.into()));
        }

        let stored = match self.store.get_request(request.id) {
            Ok(stored) => stored,
            Err(e) => return Err((request, e.into())),
        };
        let request = match stored {
            Some(stored)
                if stored.status != SignatureStatus::Draft || stored.correlation_id.is_some() =>
            {
                let error = OrchestratorError::AlreadyInitiated {
                    request_id: stored.id,
                    status: stored.status,
                };
                return Err((stored, error));
            }
            Some(stored) => {
                debug!(request_id = %stored.id, "Resuming stored signature request");
                stored
            }
            None => request,
        };

        match self.store.save_request(&request) {
            Ok(()) => Ok(request),
            Err(e) => Err((request, e.into())),
        }
    }

    /// One attempt against one provider.
    async fn attempt(
        &self,
        request: &mut SignatureRequest,
        provider_id: &ProviderId,
        document: &SigningDocument,
    ) -> std::result::Result<SignatureResult, (Option<Uuid>, AttemptFailure)> {
        let provider = self.providers.get(provider_id).cloned().ok_or_else(|| {
            (
                None,
                AttemptFailure {
                    error: OrchestratorError::UnknownProvider(provider_id.clone()),
                    failover_allowed: true,
                },
            )
        })?;

        request.provider = Some(provider_id.clone());
        request.audit_trail.record(
            AuditEvent::ProviderSelected,
            Some(SYSTEM_ACTOR),
            json!({ "provider": provider_id }),
        );

        let mut session =
            SignatureSession::open_with_ttl(request, provider_id.clone(), self.config.session_ttl());
        let session_id = session.session_id;
        request.audit_trail.record(
            AuditEvent::SessionOpened,
            Some(SYSTEM_ACTOR),
            json!({ "session_id": session_id, "provider": provider_id }),
        );

        let storage_failure = |e: common::SigningError| {
            (
                Some(session_id),
                AttemptFailure {
                    error: e.into(),
                    failover_allowed: false,
                },
            )
        };
        self.store.save_session(&session).map_err(storage_failure)?;
        self.store.save_request(request).map_err(storage_failure)?;

        debug!(
            request_id = %request.id,
            session_id = %session_id,
            provider = %provider_id,
            "Submitting signing job"
        );

        let metadata = JobMetadata {
            session_id: Some(session_id),
            subject: None,
            message: None,
        };
        let job = match self
            .call_provider(provider_id, provider.create_signing_job(request, document, &metadata))
            .await
        {
            Ok(job) => job,
            Err(e) => {
                let message = e.to_string();
                session.failure = Some(message.clone());
                session.updated_at = Utc::now();
                if let Err(store_err) = self.store.save_session(&session) {
                    error!(session_id = %session_id, "Failed to record session failure: {}", store_err);
                }
                request.audit_trail.record(
                    AuditEvent::AttemptFailed,
                    Some(SYSTEM_ACTOR),
                    json!({
                        "provider": provider_id,
                        "session_id": session_id,
                        "error": message,
                    }),
                );
                self.persist_request(request);
                metrics::record_initiation(provider_id.as_str(), false);

                return Err((
                    Some(session_id),
                    AttemptFailure {
                        error: e,
                        failover_allowed: true,
                    },
                ));
            }
        };

        self.apply_job(request, &mut session, provider_id, &job);

        self.store.save_session(&session).map_err(storage_failure)?;
        self.store.save_request(request).map_err(storage_failure)?;
        metrics::record_initiation(provider_id.as_str(), true);

        info!(
            request_id = %request.id,
            session_id = %session_id,
            provider = %provider_id,
            correlation_id = %job.correlation_id,
            status = %request.status,
            "Signature initiated"
        );

        let mut metadata = serde_json::Map::new();
        metadata.insert("session_id".into(), json!(session_id));
        metadata.insert("signatures".into(), json!(job.evidence.len()));
        metadata.insert(
            "completion_percentage".into(),
            json!(request.completion_percentage()),
        );

        Ok(SignatureResult {
            success: true,
            request_id: request.id,
            session_id: Some(session_id),
            signature_id: Some(job.correlation_id.clone()),
            provider: Some(provider_id.clone()),
            status: request.status,
            error: None,
            metadata,
        })
    }

    /// Fold a successful job into the session and the request.
    fn apply_job(
        &self,
        request: &mut SignatureRequest,
        session: &mut SignatureSession,
        provider_id: &ProviderId,
        job: &SigningJob,
    ) {
        session.correlation_id = Some(job.correlation_id.clone());
        session.status = job.status;
        session.updated_at = Utc::now();
        session
            .metadata
            .insert("correlation_id".into(), json!(job.correlation_id));
        if !job.artifacts.is_empty() {
            session
                .metadata
                .insert(ARTIFACTS_KEY.into(), Value::Array(job.artifacts.clone()));
        }

        request.correlation_id = Some(job.correlation_id.clone());
        request.audit_trail.record(
            AuditEvent::JobSubmitted,
            Some(SYSTEM_ACTOR),
            json!({
                "provider": provider_id,
                "session_id": session.session_id,
                "correlation_id": job.correlation_id,
            }),
        );

        self.capture_evidence(request, &job.evidence);

        if job.status != request.status {
            let from = request.status;
            match request.transition_to(
                job.status,
                Some(SYSTEM_ACTOR),
                json!({ "provider": provider_id, "session_id": session.session_id }),
            ) {
                Ok(()) => metrics::record_transition(from.as_str(), job.status.as_str()),
                Err(e) => warn!(request_id = %request.id, "Job status not applied: {}", e),
            }
        }
    }

    /// Record evidence for signatories that have not signed yet. Returns the
    /// number of new signatures.
    fn capture_evidence(&self, request: &mut SignatureRequest, evidence: &[SignatoryEvidence]) -> usize {
        let mut captured = 0;
        for item in evidence {
            let already_signed = request
                .signatories
                .iter()
                .any(|s| s.party_id == item.party_id && s.status == SignatoryStatus::Signed);
            if already_signed {
                continue;
            }
            if request.record_signature(&item.party_id, item.evidence.clone()) {
                request.audit_trail.record(
                    AuditEvent::SignatureCaptured,
                    Some(SYSTEM_ACTOR),
                    json!({
                        "party_id": item.party_id,
                        "signed_at": item.evidence.signed_at,
                    }),
                );
                captured += 1;
            } else {
                debug!(request_id = %request.id, party_id = %item.party_id, "Evidence for unknown signatory ignored");
            }
        }
        captured
    }

    fn persist_request(&self, request: &SignatureRequest) {
        if let Err(e) = self.store.save_request(request) {
            error!(request_id = %request.id, "Failed to persist signature request: {}", e);
        }
    }

    /// Run each item through [`initiate_signature`](Self::initiate_signature).
    /// One failure never aborts the batch.
    pub async fn handle_mixed_signing_workflow(
        &self,
        items: Vec<MixedSigningItem>,
    ) -> Vec<SignatureResult> {
        info!("Processing mixed signing batch of {} requests", items.len());

        let runs = items.iter().map(|item| {
            self.initiate_signature(item.request.clone(), &item.document, Some(&item.provider))
        });
        let results = futures::future::join_all(runs).await;

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            succeeded,
            failed = results.len() - succeeded,
            "Mixed signing batch finished"
        );
        results
    }

    /// Poll every in-flight session and mirror status changes.
    ///
    /// Unchanged remote statuses write nothing.
    pub async fn synchronize_status(&self) -> Result<SyncReport> {
        let sessions = self.store.sessions_with_status(&SignatureStatus::IN_FLIGHT)?;
        let mut report = SyncReport::default();

        for session in sessions.into_iter().filter(SignatureSession::needs_reconciliation) {
            report.checked += 1;
            let Some(provider) = self.providers.get(&session.provider).cloned() else {
                warn!(session_id = %session.session_id, provider = %session.provider, "Session bound to unknown provider");
                report.failed += 1;
                continue;
            };
            let Some(correlation_id) = session.correlation_id.clone() else {
                continue;
            };

            let remote = match self
                .call_provider(&session.provider, provider.get_status(&correlation_id))
                .await
            {
                Ok(status) => status,
                Err(e) => {
                    warn!(session_id = %session.session_id, "Status poll failed: {}", e);
                    report.failed += 1;
                    continue;
                }
            };

            match self
                .reconcile(session.session_id, remote, &[], AuditEvent::StatusSynchronized, json!({}))
                .await
            {
                Ok(Reconciled::Updated { .. }) => report.updated += 1,
                Ok(Reconciled::Unchanged | Reconciled::EvidenceRecorded { .. }) => {
                    report.unchanged += 1
                }
                Ok(Reconciled::Rejected) => report.rejected += 1,
                Err(e) => {
                    error!(session_id = %session.session_id, "Failed to apply status: {}", e);
                    report.failed += 1;
                }
            }
        }

        if report.checked > 0 {
            info!(
                checked = report.checked,
                updated = report.updated,
                rejected = report.rejected,
                failed = report.failed,
                "Status synchronization pass finished"
            );
        }
        Ok(report)
    }

    /// Apply a remote status to a session and, when the session is the
    /// request's current attempt, to the request.
    async fn reconcile(
        &self,
        session_id: Uuid,
        remote: SignatureStatus,
        evidence: &[SignatoryEvidence],
        event: AuditEvent,
        details: Value,
    ) -> Result<Reconciled> {
        // Re-read under the request lock; the snapshot may be stale.
        let request_id = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| OrchestratorError::NotFound(format!("session {}", session_id)))?
            .request_id;
        let _guard = self.lock_request(request_id).await;

        let mut session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| OrchestratorError::NotFound(format!("session {}", session_id)))?;

        if session.status == remote {
            if evidence.is_empty() {
                return Ok(Reconciled::Unchanged);
            }
            let mut request = self
                .store
                .get_request(request_id)?
                .ok_or_else(|| OrchestratorError::NotFound(format!("request {}", request_id)))?;
            let signatures = self.capture_evidence(&mut request, evidence);
            if signatures == 0 {
                return Ok(Reconciled::Unchanged);
            }
            self.store.save_request(&request)?;
            metrics::record_sync_write(sync_source(event));
            info!(
                request_id = %request.id,
                session_id = %session_id,
                signatures,
                completion = request.completion_percentage(),
                "Signer evidence recorded"
            );
            return Ok(Reconciled::EvidenceRecorded {
                session_id,
                signatures,
            });
        }
        if !session.status.can_transition(remote) {
            warn!(
                session_id = %session_id,
                from = %session.status,
                to = %remote,
                "Remote status rejected by transition table"
            );
            return Ok(Reconciled::Rejected);
        }

        let mut request = self
            .store
            .get_request(request_id)?
            .ok_or_else(|| OrchestratorError::NotFound(format!("request {}", request_id)))?;

        let from = session.status;
        session.status = remote;
        session.updated_at = Utc::now();

        self.capture_evidence(&mut request, evidence);

        let mut payload = json!({
            "session_id": session_id,
            "provider": session.provider,
            "from": from,
            "to": remote,
        });
        if let (Some(map), Value::Object(extra)) = (payload.as_object_mut(), details) {
            map.extend(extra);
        }
        request
            .audit_trail
            .record(event, Some(SYSTEM_ACTOR), payload);

        if request.correlation_id == session.correlation_id && request.status != remote {
            let request_from = request.status;
            match request.transition_to(
                remote,
                Some(SYSTEM_ACTOR),
                json!({ "session_id": session_id, "provider": session.provider }),
            ) {
                Ok(()) => metrics::record_transition(request_from.as_str(), remote.as_str()),
                Err(e) => warn!(request_id = %request.id, "Request status not updated: {}", e),
            }
        }

        self.store.save_session(&session)?;
        self.store.save_request(&request)?;
        metrics::record_sync_write(sync_source(event));

        info!(
            request_id = %request.id,
            session_id = %session_id,
            from = %from,
            to = %remote,
            "Session status updated"
        );
        Ok(Reconciled::Updated {
            session_id,
            from,
            to: remote,
        })
    }

    /// Apply an envelope webhook delivered for `provider`.
    ///
    /// Never fails: malformed, duplicate, unknown or over-retried deliveries
    /// are reported as [`WebhookOutcome::Ignored`] or
    /// [`WebhookOutcome::Unchanged`].
    pub async fn apply_webhook_event(&self, provider: &ProviderId, body: &Value) -> WebhookOutcome {
        let ignored = |reason: &str| {
            debug!(provider = %provider, reason, "Webhook ignored");
            WebhookOutcome::Ignored {
                reason: reason.to_string(),
            }
        };

        let Some(notice) = parse_webhook(body) else {
            return ignored("malformed payload");
        };
        if notice.exceeds_retry_limit() {
            return ignored("retry limit exceeded");
        }
        let Some(remote) = notice.status() else {
            return ignored("no envelope status");
        };

        let session = match self
            .store
            .find_session_by_correlation(provider, &notice.envelope_id)
        {
            Ok(Some(session)) => session,
            Ok(None) => return ignored("unknown envelope"),
            Err(e) => {
                error!("Webhook session lookup failed: {}", e);
                return ignored("storage unavailable");
            }
        };

        let details = json!({
            "event": notice.event,
            "envelope_id": notice.envelope_id,
            "retry_count": notice.retry_count,
        });
        match self
            .reconcile(
                session.session_id,
                remote,
                &notice.signed,
                AuditEvent::WebhookReceived,
                details,
            )
            .await
        {
            Ok(Reconciled::Updated {
                session_id,
                from,
                to,
            }) => WebhookOutcome::Applied {
                session_id,
                from,
                to,
            },
            Ok(Reconciled::EvidenceRecorded {
                session_id,
                signatures,
            }) => WebhookOutcome::EvidenceRecorded {
                session_id,
                signatures,
            },
            Ok(Reconciled::Unchanged) => WebhookOutcome::Unchanged,
            Ok(Reconciled::Rejected) => ignored("status transition not allowed"),
            Err(e) => {
                error!("Failed to apply webhook: {}", e);
                ignored("storage unavailable")
            }
        }
    }

    /// Current provider-side status; lookup failures degrade to `draft`.
    pub async fn get_signature_status(
        &self,
        correlation_id: &str,
        provider: &ProviderId,
    ) -> SignatureStatus {
        let Some(p) = self.providers.get(provider) else {
            warn!(provider = %provider, "Status requested from unknown provider");
            return SignatureStatus::Draft;
        };
        match self.call_provider(provider, p.get_status(correlation_id)).await {
            Ok(status) => status,
            Err(e) => {
                warn!(provider = %provider, correlation_id, "Failed to get signature status: {}", e);
                SignatureStatus::Draft
            }
        }
    }

    /// Verify through the provider; failures degrade to `false`.
    ///
    /// A correlation id whose session holds signature artifacts is verified
    /// from those artifacts, so results survive a restart of the provider.
    pub async fn verify_signature(
        &self,
        target: &VerificationTarget,
        provider: &ProviderId,
        document: &SigningDocument,
    ) -> bool {
        let Some(p) = self.providers.get(provider) else {
            warn!(provider = %provider, "Verification requested from unknown provider");
            return false;
        };

        let targets = match target {
            VerificationTarget::Correlation(id) => match self.stored_artifacts(provider, id) {
                Some(artifacts) => artifacts
                    .into_iter()
                    .map(VerificationTarget::Artifact)
                    .collect(),
                None => vec![target.clone()],
            },
            VerificationTarget::Artifact(_) => vec![target.clone()],
        };

        for target in &targets {
            match self.call_provider(provider, p.verify(target, document)).await {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    warn!(provider = %provider, "Signature verification failed: {}", e);
                    return false;
                }
            }
        }
        true
    }

    fn stored_artifacts(&self, provider: &ProviderId, correlation_id: &str) -> Option<Vec<Value>> {
        let session = match self.store.find_session_by_correlation(provider, correlation_id) {
            Ok(session) => session?,
            Err(e) => {
                warn!(provider = %provider, correlation_id, "Session lookup failed: {}", e);
                return None;
            }
        };
        match session.metadata.get(ARTIFACTS_KEY) {
            Some(Value::Array(artifacts)) if !artifacts.is_empty() => Some(artifacts.clone()),
            _ => None,
        }
    }

    /// Mark `provider` unavailable and notify operators.
    pub async fn handle_provider_failure(&self, provider: &ProviderId, error: &str) {
        self.monitor.report_failure(provider, error).await;
        error!(
            target: "notifications",
            provider = %provider,
            error,
            "Signature provider failure requires attention"
        );
    }

    pub async fn provider_status(&self) -> Vec<ProviderStatus> {
        self.monitor.snapshot().await
    }

    pub fn get_request(&self, id: Uuid) -> Result<Option<SignatureRequest>> {
        Ok(self.store.get_request(id)?)
    }

    pub fn sessions_for_request(&self, id: Uuid) -> Result<Vec<SignatureSession>> {
        Ok(self.store.sessions_for_request(id)?)
    }
}
