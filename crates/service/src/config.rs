//! Service configuration.
//!
//! Loaded from an optional TOML file, then overridden by `SIGNING__*`
//! environment variables (`SIGNING__ORCHESTRATOR__SYNC_INTERVAL_SECS=60`).

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use common::ProviderId;
use orchestrator::OrchestratorConfig;
use providers::envelope::EnvelopeConfig;
use providers::pki::PkiConfig;

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/signatures.db")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// SQLite file holding requests and sessions.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub envelope: Option<EnvelopeConfig>,

    #[serde(default)]
    pub pki: Option<PkiConfig>,
}

impl ServiceConfig {
    /// Read `path` (extension optional, file optional) and the environment.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("SIGNING")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path))?;

        let config: ServiceConfig = settings
            .try_deserialize()
            .context("Invalid service configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Ids of the providers this configuration enables.
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        let mut ids = Vec::new();
        if let Some(envelope) = &self.envelope {
            ids.push(ProviderId::new(envelope.provider_id.clone()));
        }
        if let Some(pki) = &self.pki {
            ids.push(ProviderId::new(pki.provider_id.clone()));
        }
        ids
    }

    pub fn validate(&self) -> Result<()> {
        let ids = self.provider_ids();
        if ids.is_empty() {
            bail!("at least one of [envelope] or [pki] must be configured");
        }
        if ids.len() == 2 && ids[0] == ids[1] {
            bail!("envelope and pki providers share the id {}", ids[0]);
        }
        if !ids.contains(&self.orchestrator.default_provider) {
            bail!(
                "default provider {} is not configured",
                self.orchestrator.default_provider
            );
        }
        if let Some(fallback) = &self.orchestrator.fallback_provider {
            if !ids.contains(fallback) {
                bail!("fallback provider {} is not configured", fallback);
            }
        }
        if self.orchestrator.sync_interval_secs == 0 || self.orchestrator.health_check_interval_secs == 0 {
            bail!("loop intervals must be greater than zero");
        }
        Ok(())
    }
}
