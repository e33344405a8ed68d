//! Process entry point: start order persistence → registry → control
//! surface → transport listener (spec §9); shutdown reverses it.

use std::sync::Arc;

use clap::Parser;
use mediation::analytics::{AnalyticsProvider, HttpAnalyticsProvider};
use mediation::config::Config;
use mediation::control::{build_router, AppState};
use mediation::session::SessionManager;
use mediation::summary::SummaryWriter;
use mediation::supervisor::SupervisorRegistry;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::parse());
    init_tracing(&config);

    let storage = mediation_storage::create_storage(config.storage_factory_config())
        .map_err(|e| anyhow::anyhow!("failed to initialize summary storage: {e}"))?;

    let registry = Arc::new(SupervisorRegistry::new());

    let provider: Arc<dyn AnalyticsProvider> = Arc::new(HttpAnalyticsProvider::new(
        reqwest::Client::new(),
        config.analytics_base_url.clone(),
        config.api_key.clone(),
        config.analysis_model.clone(),
    ));

    let summary_writer = SummaryWriter::spawn(storage.clone(), config.summary_writer_queue_capacity);

    let manager = SessionManager::new(registry.clone(), provider.clone(), summary_writer, config.clone());

    let state = AppState {
        manager: manager.clone(),
        registry,
        provider,
        storage,
        config: config.clone(),
    };

    let auth_config = config.control_plane_auth_config();
    let app = build_router(state, auth_config);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "mediation server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("mediation server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

fn init_tracing(config: &Config) {
    let filter = if config.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}
