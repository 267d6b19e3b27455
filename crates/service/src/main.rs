//! Signature orchestration service.
//!
//! Hosts the orchestrator's background loops and exposes health, provider
//! status, metrics and the envelope webhook receiver over HTTP.

mod config;
mod error;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use common::{ProviderId, SqliteSignatureStore};
use orchestrator::SignatureOrchestrator;
use providers::envelope::RemoteEnvelopeProvider;
use providers::pki::LocalSigningProvider;
use providers::SigningProvider;

use crate::config::ServiceConfig;
use crate::handlers::AppState;

#[derive(Parser, Debug)]
#[command(name = "signing-service", version, about = "Multi-provider signature orchestration service")]
struct Args {
    /// Configuration file (TOML, extension optional)
    #[arg(short, long, env = "SIGNING_CONFIG", default_value = "config/signing")]
    config: String,

    /// Override the listen address
    #[arg(long, env = "SIGNING_LISTEN_ADDR")]
    listen: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_providers(config: &ServiceConfig) -> Result<Vec<Arc<dyn SigningProvider>>> {
    let mut providers: Vec<Arc<dyn SigningProvider>> = Vec::new();

    if let Some(envelope) = &config.envelope {
        debug!(?envelope, "Configuring envelope provider");
        let provider = RemoteEnvelopeProvider::new(envelope.clone())
            .context("Failed to configure envelope provider")?;
        providers.push(Arc::new(provider));
    }

    if let Some(pki) = &config.pki {
        let provider = LocalSigningProvider::from_config(pki)
            .context("Failed to configure local signing provider")?;
        let validation = provider.validate_own_certificate();
        if !validation.valid {
            warn!(errors = ?validation.errors, "Signer certificate is not currently valid");
        }
        providers.push(Arc::new(provider));
    }

    Ok(providers)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("========================================");
    info!("  Signature Orchestration Service");
    info!("========================================");

    let mut config = ServiceConfig::load(&args.config)?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    if let Some(parent) = config.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = Arc::new(
        SqliteSignatureStore::open(&config.database_path)
            .with_context(|| format!("Failed to open {}", config.database_path.display()))?,
    );
    info!("Signature store: {}", config.database_path.display());

    let providers = build_providers(&config)?;
    let orchestrator = Arc::new(SignatureOrchestrator::new(
        config.orchestrator.clone(),
        providers,
        store,
    )?);
    orchestrator.start().await;

    let state = AppState {
        orchestrator: orchestrator.clone(),
        envelope_provider: config
            .envelope
            .as_ref()
            .map(|e| ProviderId::new(e.provider_id.clone())),
    };
    let app = handlers::router(state);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.listen_addr))?;

    info!("Configuration:");
    info!("  - Listen address: {}", addr);
    info!("  - Default provider: {}", config.orchestrator.default_provider);
    if let Some(fallback) = &config.orchestrator.fallback_provider {
        info!("  - Fallback provider: {}", fallback);
    }
    info!("  - Health check interval: {}s", config.orchestrator.health_check_interval_secs);
    info!("  - Sync interval: {}s", config.orchestrator.sync_interval_secs);
    info!("");
    info!("Endpoints:");
    info!("  GET    /health              - Health check");
    info!("  GET    /providers/status    - Provider availability");
    info!("  GET    /requests/:id        - Request with its sessions");
    info!("  POST   /sync                - Run status synchronization now");
    info!("  POST   /webhooks/envelope   - Envelope status notifications");
    info!("  GET    /metrics             - Prometheus metrics");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    orchestrator.stop().await;
    info!("Service stopped");
    Ok(())
}
