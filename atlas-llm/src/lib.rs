//! Atlas LLM - Knowledge Provider Abstraction
//!
//! Provider-agnostic trait for the web-search knowledge endpoint used by the
//! knowledge-absorption and task-discovery modes, plus a registry that
//! reports a missing provider as `ProviderNotConfigured`.

pub mod providers;

pub use providers::openai_compat::{ChatKnowledgeProvider, KnowledgeClient};

use async_trait::async_trait;
use atlas_core::{AtlasError, AtlasResult, LlmError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// KNOWLEDGE PROVIDER TRAIT
// ============================================================================

/// A system + user prompt pair with generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl KnowledgeRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            max_tokens: 1_024,
            temperature: 0.2,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Free text answer with optional source citations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeResponse {
    pub content: String,
    #[serde(default)]
    pub citations: Vec<String>,
}

/// Trait for knowledge providers.
/// Implementations must be thread-safe (Send + Sync) and must not retry
/// internally; callers wrap calls in the retry utility.
#[async_trait]
pub trait KnowledgeProvider: Send + Sync {
    /// Run one prompt.
    async fn query(&self, request: &KnowledgeRequest) -> AtlasResult<KnowledgeResponse>;

    /// Provider name for logs.
    fn provider_name(&self) -> &str;
}

// ============================================================================
// PROVIDER REGISTRY
// ============================================================================

/// Registry for knowledge providers.
/// Providers must be explicitly registered - no auto-discovery.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    knowledge: Option<Arc<dyn KnowledgeProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `provider` already registered.
    pub fn with_knowledge(provider: Arc<dyn KnowledgeProvider>) -> Self {
        Self {
            knowledge: Some(provider),
        }
    }

    /// Register a knowledge provider, replacing any previous one.
    pub fn register_knowledge(&mut self, provider: Arc<dyn KnowledgeProvider>) {
        self.knowledge = Some(provider);
    }

    /// Get the registered knowledge provider.
    pub fn knowledge(&self) -> AtlasResult<Arc<dyn KnowledgeProvider>> {
        self.knowledge
            .clone()
            .ok_or(AtlasError::Llm(LlmError::ProviderNotConfigured))
    }

    /// Check if a knowledge provider is registered.
    pub fn has_knowledge(&self) -> bool {
        self.knowledge.is_some()
    }

    /// Clear the knowledge provider registration.
    pub fn clear_knowledge(&mut self) {
        self.knowledge = None;
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field(
                "knowledge",
                &self.knowledge.as_ref().map(|p| p.provider_name().to_string()),
            )
            .finish()
    }
}
