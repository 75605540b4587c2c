//! Atlas API Server Entry Point
//!
//! Bootstraps configuration, builds the PostgreSQL store and knowledge
//! provider, and starts the Axum HTTP server.

use std::sync::Arc;

use atlas_api::telemetry::init_tracing;
use atlas_api::{
    create_router, provider_registry, ApiConfig, ApiError, ApiResult, AppState, DbConfig,
    KnowledgeSettings, PgStore,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing()?;

    let api_config = ApiConfig::from_env()?;
    let tuning = api_config.load_tuning()?;

    let db_config = DbConfig::from_env()?;
    let store = PgStore::from_config(&db_config)?;
    if db_config.auto_migrate {
        store.ensure_schema().await?;
    }

    let providers = provider_registry(KnowledgeSettings::from_env().as_ref())?;
    let state = AppState::new(Arc::new(store), providers, tuning)?;
    let app = create_router(state);

    let addr = api_config.socket_addr()?;
    tracing::info!(%addr, db_host = %db_config.host, "Starting Atlas API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
