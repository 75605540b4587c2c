//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use atlas_core::{AtlasResult, EvolutionConfig};
use atlas_engine::EvolutionEngine;
use atlas_llm::ProviderRegistry;
use atlas_storage::EvolutionStore;
use axum::extract::FromRef;

/// Application-wide state shared across all routes.
///
/// Holds nothing that outlives a request beyond the store handle and the
/// immutable engine configuration.
#[derive(Clone)]
pub struct AppState {
    pub engine: EvolutionEngine,
    /// Same store the engine writes through, kept for health checks.
    pub store: Arc<dyn EvolutionStore>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn EvolutionStore>,
        providers: ProviderRegistry,
        config: EvolutionConfig,
    ) -> AtlasResult<Self> {
        let engine = EvolutionEngine::new(store.clone(), providers, config)?;
        Ok(Self {
            engine,
            store,
            start_time: Instant::now(),
        })
    }
}

impl FromRef<AppState> for EvolutionEngine {
    fn from_ref(state: &AppState) -> Self {
        state.engine.clone()
    }
}
