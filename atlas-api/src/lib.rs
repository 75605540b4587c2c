//! Atlas API - HTTP Entry Point
//!
//! Exposes the evolution engine over HTTP (Axum), backed by a PostgreSQL
//! store. Configuration comes from environment variables; the tuning table
//! can be overlaid from a TOML file.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::{provider_registry, ApiConfig, KnowledgeSettings};
pub use db::{DbConfig, PgStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_router;
pub use state::AppState;
