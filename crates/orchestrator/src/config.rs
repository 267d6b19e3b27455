//! Orchestrator settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use common::{ProviderId, DEFAULT_SESSION_TTL_DAYS};

fn default_provider() -> ProviderId {
    ProviderId::new(providers::envelope::ENVELOPE_PROVIDER_ID)
}

fn default_health_interval() -> u64 {
    60
}

fn default_sync_interval() -> u64 {
    300
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_session_ttl() -> i64 {
    DEFAULT_SESSION_TTL_DAYS
}

/// Selection, timing and lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Provider used when the caller has no preference.
    #[serde(default = "default_provider")]
    pub default_provider: ProviderId,

    /// Provider retried once when an attempt fails.
    #[serde(default)]
    pub fallback_provider: Option<ProviderId>,

    /// Health probe interval (seconds)
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,

    /// Status reconciliation interval (seconds)
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Upper bound for one provider call (seconds)
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    /// Upper bound for one health probe (seconds)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_session_ttl")]
    pub session_ttl_days: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            fallback_provider: None,
            health_check_interval_secs: default_health_interval(),
            sync_interval_secs: default_sync_interval(),
            provider_timeout_secs: default_provider_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            session_ttl_days: default_session_ttl(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_default_provider(mut self, provider: impl Into<ProviderId>) -> Self {
        self.default_provider = provider.into();
        self
    }

    pub fn with_fallback_provider(mut self, provider: impl Into<ProviderId>) -> Self {
        self.fallback_provider = Some(provider.into());
        self
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.session_ttl_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.default_provider.as_str(), "envelope");
        assert!(config.fallback_provider.is_none());
        assert_eq!(config.health_check_interval(), Duration::from_secs(60));
        assert_eq!(config.session_ttl().num_days(), 7);
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: OrchestratorConfig = serde_json::from_value(serde_json::json!({
            "default_provider": "pki",
            "fallback_provider": "envelope",
            "provider_timeout_secs": 5
        }))
        .unwrap();
        assert_eq!(config.default_provider.as_str(), "pki");
        assert_eq!(config.fallback_provider.as_ref().unwrap().as_str(), "envelope");
        assert_eq!(config.provider_timeout(), Duration::from_secs(5));
        assert_eq!(config.sync_interval_secs, 300);
    }
}
