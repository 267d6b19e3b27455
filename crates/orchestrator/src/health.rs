//! Provider availability monitoring.
//!
//! The monitor periodically calls every provider's `health_check` and keeps
//! the latest [`ProviderStatus`] per provider. It is the only writer of that
//! map; the orchestrator reads snapshots and reports hard failures through
//! [`ProviderHealthMonitor::report_failure`].

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use common::{ProviderId, ProviderStatus};
use providers::SigningProvider;

use crate::metrics;
use crate::task::PeriodicTask;

/// Registered providers keyed by id.
pub type ProviderSet = BTreeMap<ProviderId, Arc<dyn SigningProvider>>;

/// Status recorded for a provider before its first probe.
const NOT_YET_PROBED: &str = "not yet probed";

/// Background health prober with a shared status map.
pub struct ProviderHealthMonitor {
    providers: Arc<ProviderSet>,
    statuses: RwLock<BTreeMap<ProviderId, ProviderStatus>>,
    interval: Duration,
    probe_timeout: Duration,
    task: Mutex<Option<PeriodicTask>>,
}

impl ProviderHealthMonitor {
    pub fn new(providers: Arc<ProviderSet>, interval: Duration, probe_timeout: Duration) -> Self {
        let statuses = providers
            .keys()
            .map(|id| (id.clone(), ProviderStatus::unavailable(id.clone(), NOT_YET_PROBED)))
            .collect();

        Self {
            providers,
            statuses: RwLock::new(statuses),
            interval,
            probe_timeout,
            task: Mutex::new(None),
        }
    }

    /// Start the probe loop. Calling `start` on a running monitor is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| t.is_running()) {
            debug!("Health monitor already running");
            return;
        }

        let monitor: Weak<Self> = Arc::downgrade(self);
        *task = Some(PeriodicTask::spawn("health-check", self.interval, move || {
            let monitor = monitor.clone();
            async move {
                if let Some(monitor) = monitor.upgrade() {
                    monitor.probe_all().await;
                }
            }
        }));
    }

    /// Stop the probe loop and wait for it to exit.
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.stop().await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| t.is_running())
    }

    /// Probe every provider concurrently and record the results.
    pub async fn probe_all(&self) {
        debug!("Running health check for {} providers", self.providers.len());

        let probes: Vec<_> = self
            .providers
            .iter()
            .map(|(id, provider)| {
                let provider = provider.clone();
                let id = id.clone();
                let timeout = self.probe_timeout;
                async move {
                    match tokio::time::timeout(timeout, provider.health_check()).await {
                        Ok(Ok(true)) => ProviderStatus::available(id),
                        Ok(Ok(false)) => ProviderStatus::unavailable(id, "health check reported unavailable"),
                        Ok(Err(e)) => ProviderStatus::unavailable(id, e.to_string()),
                        Err(_) => ProviderStatus::unavailable(
                            id,
                            format!("health check timed out after {:?}", timeout),
                        ),
                    }
                }
            })
            .collect();

        let results = futures::future::join_all(probes).await;

        let mut statuses = self.statuses.write().await;
        for status in results {
            let previous = statuses.get(&status.provider).map(|s| s.is_available);
            if previous != Some(status.is_available) {
                if status.is_available {
                    info!(provider = %status.provider, "Provider became available");
                } else {
                    warn!(
                        provider = %status.provider,
                        error = status.error.as_deref().unwrap_or(""),
                        "Provider unavailable"
                    );
                }
            }
            metrics::set_provider_available(status.provider.as_str(), status.is_available);
            statuses.insert(status.provider.clone(), status);
        }
    }

    /// Mark a provider unavailable until its next successful probe.
    pub async fn report_failure(&self, provider: &ProviderId, error: &str) {
        if !self.providers.contains_key(provider) {
            return;
        }
        warn!(provider = %provider, error, "Provider failure reported");
        metrics::set_provider_available(provider.as_str(), false);
        self.statuses
            .write()
            .await
            .insert(provider.clone(), ProviderStatus::unavailable(provider.clone(), error));
    }

    /// Copy of all statuses, ordered by provider id.
    pub async fn snapshot(&self) -> Vec<ProviderStatus> {
        self.statuses.read().await.values().cloned().collect()
    }

    pub async fn availability(&self) -> BTreeMap<ProviderId, bool> {
        self.statuses
            .read()
            .await
            .iter()
            .map(|(id, s)| (id.clone(), s.is_available))
            .collect()
    }

    pub async fn is_available(&self, provider: &ProviderId) -> bool {
        self.statuses
            .read()
            .await
            .get(provider)
            .is_some_and(|s| s.is_available)
    }
}
