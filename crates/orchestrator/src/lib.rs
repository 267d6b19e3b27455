//! Multi-provider signature orchestration.
//!
//! - [`SignatureOrchestrator`]: provider selection, failover, sessions and
//!   status reconciliation
//! - [`ProviderHealthMonitor`]: background availability probing
//! - [`select_provider`]: the pure selection rule shared by both

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod orchestrator;
pub mod selection;
pub mod task;

pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use health::{ProviderHealthMonitor, ProviderSet};
pub use orchestrator::{
    MixedSigningItem, SignatureOrchestrator, SignatureResult, SyncReport, WebhookOutcome,
    ARTIFACTS_KEY, SYSTEM_ACTOR,
};
pub use selection::{select_provider, SelectionPolicy};
pub use task::PeriodicTask;
