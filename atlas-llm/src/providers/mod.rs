//! Knowledge provider implementations

pub mod openai_compat;

use atlas_core::{AtlasError, LlmError};

pub(crate) fn request_failed(provider: &str, status: u16, message: impl Into<String>) -> AtlasError {
    AtlasError::Llm(LlmError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    })
}

pub(crate) fn rate_limited(provider: &str) -> AtlasError {
    AtlasError::Llm(LlmError::RateLimited {
        provider: provider.to_string(),
    })
}

pub(crate) fn transport(provider: &str, message: impl Into<String>) -> AtlasError {
    AtlasError::Llm(LlmError::Transport {
        provider: provider.to_string(),
        message: message.into(),
    })
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> AtlasError {
    AtlasError::Llm(LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    })
}
