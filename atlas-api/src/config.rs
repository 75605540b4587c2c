//! API Configuration Module
//!
//! Server, tuning and knowledge-provider settings, read from environment
//! variables. Every reader has a `from_lookup` twin so tests can feed a map
//! instead of mutating the process environment.

use atlas_core::{AtlasResult, EvolutionConfig};
use atlas_llm::{ChatKnowledgeProvider, KnowledgeClient, ProviderRegistry};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};

const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_KNOWLEDGE_RPM: u32 = 50;

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ============================================================================
// SERVER CONFIGURATION
// ============================================================================

/// HTTP server and engine tuning settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub bind: String,
    pub port: u16,
    /// TOML overlay for the tuning table. `None` uses defaults.
    pub tuning_file: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            tuning_file: None,
        }
    }
}

impl ApiConfig {
    /// Environment variables:
    /// - `ATLAS_API_BIND`: listen address (default: 0.0.0.0)
    /// - `PORT` or `ATLAS_API_PORT`: listen port (default: 3000)
    /// - `ATLAS_TUNING_FILE`: optional TOML tuning overlay
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ApiResult<Self> {
        let bind = lookup("ATLAS_API_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let port = match lookup("PORT").or_else(|| lookup("ATLAS_API_PORT")) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ApiError::configuration(format!("Invalid port value: {}", raw)))?,
            None => DEFAULT_PORT,
        };
        Ok(Self {
            bind,
            port,
            tuning_file: lookup("ATLAS_TUNING_FILE").map(PathBuf::from),
        })
    }

    pub fn socket_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ApiError::configuration(format!("Invalid bind address {}: {}", addr, e)))
    }

    /// Tuning table: the overlay file if one is set, otherwise defaults.
    pub fn load_tuning(&self) -> AtlasResult<EvolutionConfig> {
        match &self.tuning_file {
            Some(path) => EvolutionConfig::from_path(path),
            None => Ok(EvolutionConfig::default()),
        }
    }
}

// ============================================================================
// KNOWLEDGE PROVIDER
// ============================================================================

/// Credentials and endpoint for the web-search knowledge provider.
#[derive(Clone, PartialEq)]
pub struct KnowledgeSettings {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub requests_per_minute: u32,
}

impl std::fmt::Debug for KnowledgeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeSettings")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

impl KnowledgeSettings {
    /// Environment variables:
    /// - `ATLAS_KNOWLEDGE_API_KEY`: bearer token; absent means no provider
    /// - `ATLAS_KNOWLEDGE_BASE_URL`: endpoint override
    /// - `ATLAS_KNOWLEDGE_MODEL`: model override
    /// - `ATLAS_KNOWLEDGE_RPM`: request limit per minute (default: 50)
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let api_key = lookup("ATLAS_KNOWLEDGE_API_KEY")?;
        Some(Self {
            api_key,
            base_url: lookup("ATLAS_KNOWLEDGE_BASE_URL"),
            model: lookup("ATLAS_KNOWLEDGE_MODEL"),
            requests_per_minute: lookup("ATLAS_KNOWLEDGE_RPM")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_KNOWLEDGE_RPM),
        })
    }

    /// Build the HTTP-backed provider.
    pub fn build_provider(&self) -> AtlasResult<ChatKnowledgeProvider> {
        let mut client = KnowledgeClient::new(self.api_key.clone(), self.requests_per_minute)?;
        if let Some(url) = &self.base_url {
            client = client.with_base_url(url.clone());
        }
        Ok(match &self.model {
            Some(model) => ChatKnowledgeProvider::new(client, model.clone()),
            None => ChatKnowledgeProvider::with_default_model(client),
        })
    }
}

/// Provider registry for the engine. Without settings the registry is empty
/// and the knowledge-driven modes log and skip.
pub fn provider_registry(settings: Option<&KnowledgeSettings>) -> AtlasResult<ProviderRegistry> {
    match settings {
        Some(settings) => {
            let provider = settings.build_provider()?;
            tracing::info!(model = provider.model(), "Knowledge provider configured");
            Ok(ProviderRegistry::with_knowledge(Arc::new(provider)))
        }
        None => {
            tracing::warn!("ATLAS_KNOWLEDGE_API_KEY not set, knowledge modes disabled");
            Ok(ProviderRegistry::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ApiConfig::default());
        assert_eq!(config.socket_addr().unwrap().port(), 3000);
    }

    #[test]
    fn test_port_precedence() {
        let config =
            ApiConfig::from_lookup(lookup(&[("PORT", "8080"), ("ATLAS_API_PORT", "9090")])).unwrap();
        assert_eq!(config.port, 8080);

        let config = ApiConfig::from_lookup(lookup(&[("ATLAS_API_PORT", "9090")])).unwrap();
        assert_eq!(config.port, 9090);
    }

    #[test]
    fn test_invalid_port_rejected() {
        let err = ApiConfig::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert!(err.message.contains("Invalid port"));
    }

    #[test]
    fn test_invalid_bind_rejected() {
        let config = ApiConfig::from_lookup(lookup(&[("ATLAS_API_BIND", "not an ip")])).unwrap();
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_missing_tuning_file_is_config_error() {
        let config = ApiConfig {
            tuning_file: Some(PathBuf::from("/nonexistent/atlas-tuning.toml")),
            ..Default::default()
        };
        assert!(config.load_tuning().is_err());
        assert_eq!(
            ApiConfig::default().load_tuning().unwrap(),
            EvolutionConfig::default()
        );
    }

    #[test]
    fn test_knowledge_settings_require_key() {
        assert!(KnowledgeSettings::from_lookup(lookup(&[("ATLAS_KNOWLEDGE_MODEL", "sonar")])).is_none());

        let settings = KnowledgeSettings::from_lookup(lookup(&[
            ("ATLAS_KNOWLEDGE_API_KEY", "secret"),
            ("ATLAS_KNOWLEDGE_RPM", "12"),
        ]))
        .unwrap();
        assert_eq!(settings.requests_per_minute, 12);
        assert!(settings.model.is_none());
        assert!(!format!("{:?}", settings).contains("secret"));
    }

    #[test]
    fn test_registry_without_settings_is_empty() {
        let registry = provider_registry(None).unwrap();
        assert!(!registry.has_knowledge());
    }
}
