//! `authz-server` entry point.
//!
//! Bootstraps the policy store (in-memory or SQLite, depending on
//! `AUTHZ_DATA_FILE`), seeds it with the built-in defaults, validates the
//! Subject Detector configuration, then starts the Axum HTTP server with
//! graceful shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use authz_core::config::default_subject_type_configs;
use authz_core::{seeder, subject, PolicyStore};
use authz_store::{MemoryBackend, PolicyBackend, SqliteBackend};

use authz_server::config::ServerConfig;
use authz_server::cr_store::CrRegistry;
use authz_server::routes::build_router;
use authz_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)))
        .json()
        .init();

    info!(data_file = %config.authz_data_file, cache_enabled = config.cache.enabled, "authz-server starting");

    let state = build_app_state(&config).await?;
    let app = build_router(Arc::clone(&state));

    let listener = TcpListener::bind(&state.config.bind_address).await.with_context(|| format!("failed to bind to {}", state.config.bind_address))?;
    info!(addr = %state.config.bind_address, "authz-server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.context("server error")?;

    info!("authz-server stopped");
    Ok(())
}

/// Build the shared application state: pick a backend, seed it, validate the
/// Subject Detector configuration, and populate the in-memory CR registry
/// from it.
async fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let backend: Arc<dyn PolicyBackend> = if config.authz_data_file == ":memory:" {
        info!("using in-memory policy store (data will not persist)");
        Arc::new(MemoryBackend::new())
    } else {
        info!(path = %config.authz_data_file, "using SQLite policy store");
        Arc::new(SqliteBackend::connect(&config.authz_data_file).await.context("failed to open SQLite policy store")?)
    };

    let store = PolicyStore::new(backend, config.cache);
    let summary = seeder::seed_defaults(&store).await.context("failed to seed policy store")?;
    info!(
        actions_inserted = summary.actions_inserted,
        grants_inserted = summary.grants_inserted,
        bindings_inserted = summary.bindings_inserted,
        "policy store seeded"
    );

    let subject_configs = subject::sorted_by_priority(default_subject_type_configs());
    subject::validate_config(&subject_configs).context("invalid subject detector configuration")?;

    let cr_registry = CrRegistry::default();
    cr_registry.seed_system_defaults().await;

    Ok(Arc::new(AppState { store, cr_registry, subject_configs, config: config.clone() }))
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
