//! Shared fakes for orchestrator integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use common::{
    ProviderId, Signatory, SignatureRequest, SignatureSession, SignatureStatus, SignatureStore,
    SigningDocument, SigningError, SqliteSignatureStore, WorkflowMode,
};
use orchestrator::{OrchestratorConfig, SignatureOrchestrator};
use providers::{JobMetadata, ProviderError, SigningJob, SigningProvider, VerificationTarget};

/// What a [`ScriptedProvider`] does when asked to create a job.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Accept and report the given status.
    Accept(SignatureStatus),
    /// Fail with a network error.
    NetworkDown,
    /// Fail with a business rejection.
    Reject,
    /// Never answer.
    Hang,
}

/// In-memory provider whose answers are set by the test.
pub struct ScriptedProvider {
    id: ProviderId,
    healthy: AtomicBool,
    behavior: Mutex<Behavior>,
    remote: Mutex<HashMap<String, SignatureStatus>>,
    pub created: AtomicUsize,
    pub polled: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(id: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id: ProviderId::new(id),
            healthy: AtomicBool::new(true),
            behavior: Mutex::new(behavior),
            remote: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
            polled: AtomicUsize::new(0),
        })
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Change what `get_status` reports for a job.
    pub fn set_remote(&self, correlation_id: &str, status: SignatureStatus) {
        self.remote
            .lock()
            .unwrap()
            .insert(correlation_id.to_string(), status);
    }

    /// Drop a job so `get_status` reports it as unknown.
    pub fn forget(&self, correlation_id: &str) {
        self.remote.lock().unwrap().remove(correlation_id);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn polled(&self) -> usize {
        self.polled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SigningProvider for ScriptedProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn create_signing_job(
        &self,
        _request: &SignatureRequest,
        _document: &SigningDocument,
        metadata: &JobMetadata,
    ) -> Result<SigningJob, ProviderError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            Behavior::Accept(status) => {
                let correlation_id = format!(
                    "{}-{}",
                    self.id,
                    metadata.session_id.unwrap_or_else(Uuid::new_v4)
                );
                self.set_remote(&correlation_id, status);
                Ok(SigningJob {
                    correlation_id,
                    status,
                    evidence: Vec::new(),
                    artifacts: Vec::new(),
                })
            }
            Behavior::NetworkDown => Err(ProviderError::Network("connection refused".into())),
            Behavior::Reject => Err(ProviderError::Rejected {
                status: 400,
                message: "ENVELOPE_IS_INCOMPLETE".into(),
            }),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::Timeout("hung".into()))
            }
        }
    }

    async fn get_status(&self, correlation_id: &str) -> Result<SignatureStatus, ProviderError> {
        self.polled.fetch_add(1, Ordering::SeqCst);
        self.remote
            .lock()
            .unwrap()
            .get(correlation_id)
            .copied()
            .ok_or_else(|| ProviderError::NotFound(correlation_id.to_string()))
    }

    async fn verify(
        &self,
        target: &VerificationTarget,
        _document: &SigningDocument,
    ) -> Result<bool, ProviderError> {
        match target {
            VerificationTarget::Correlation(id) => Ok(self.remote.lock().unwrap().contains_key(id)),
            VerificationTarget::Artifact(_) => Err(ProviderError::Unsupported("artifacts".into())),
        }
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(self.healthy.load(Ordering::SeqCst))
    }
}

/// Store wrapper counting writes.
pub struct CountingStore {
    inner: SqliteSignatureStore,
    writes: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteSignatureStore::open_in_memory().unwrap(),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SignatureStore for CountingStore {
    fn save_request(&self, request: &SignatureRequest) -> Result<(), SigningError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.save_request(request)
    }

    fn get_request(&self, id: Uuid) -> Result<Option<SignatureRequest>, SigningError> {
        self.inner.get_request(id)
    }

    fn save_session(&self, session: &SignatureSession) -> Result<(), SigningError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.save_session(session)
    }

    fn get_session(&self, id: Uuid) -> Result<Option<SignatureSession>, SigningError> {
        self.inner.get_session(id)
    }

    fn sessions_for_request(&self, request_id: Uuid) -> Result<Vec<SignatureSession>, SigningError> {
        self.inner.sessions_for_request(request_id)
    }

    fn sessions_with_status(
        &self,
        statuses: &[SignatureStatus],
    ) -> Result<Vec<SignatureSession>, SigningError> {
        self.inner.sessions_with_status(statuses)
    }

    fn find_session_by_correlation(
        &self,
        provider: &ProviderId,
        correlation_id: &str,
    ) -> Result<Option<SignatureSession>, SigningError> {
        self.inner.find_session_by_correlation(provider, correlation_id)
    }
}

pub fn request(parties: &[&str], workflow: WorkflowMode) -> SignatureRequest {
    let signatories = parties
        .iter()
        .enumerate()
        .map(|(i, p)| Signatory::new(*p, i as u32 + 1))
        .collect();
    SignatureRequest::new("doc-1", Some("mou-1".into()), signatories, workflow).unwrap()
}

pub fn document() -> SigningDocument {
    SigningDocument::new("agreement.pdf", b"%PDF-1.7 memorandum of understanding".to_vec())
}

/// Orchestrator over `providers` with every provider probed once.
pub async fn orchestrator(
    config: OrchestratorConfig,
    providers: &[Arc<ScriptedProvider>],
    store: Arc<CountingStore>,
) -> SignatureOrchestrator {
    let providers = providers
        .iter()
        .map(|p| p.clone() as Arc<dyn SigningProvider>)
        .collect();
    let orchestrator = SignatureOrchestrator::new(config, providers, store).unwrap();
    orchestrator.monitor().probe_all().await;
    orchestrator
}
