//! Knowledge provider over a chat-completions endpoint

use super::client::KnowledgeClient;
use super::types::{CompletionRequest, CompletionResponse, Message};
use crate::providers::invalid_response;
use crate::{KnowledgeProvider, KnowledgeRequest, KnowledgeResponse};
use async_trait::async_trait;
use atlas_core::AtlasResult;

/// Default search-backed model.
pub const DEFAULT_MODEL: &str = "sonar";

/// [`KnowledgeProvider`] backed by [`KnowledgeClient`].
#[derive(Debug)]
pub struct ChatKnowledgeProvider {
    client: KnowledgeClient,
    model: String,
}

impl ChatKnowledgeProvider {
    pub fn new(client: KnowledgeClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Provider with the default model.
    pub fn with_default_model(client: KnowledgeClient) -> Self {
        Self::new(client, DEFAULT_MODEL)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, request: &KnowledgeRequest) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(request.system_prompt.clone()),
                Message::user(request.user_prompt.clone()),
            ],
            max_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature),
        }
    }
}

/// First choice's text plus citations.
fn into_knowledge(provider: &str, response: CompletionResponse) -> AtlasResult<KnowledgeResponse> {
    let content = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| invalid_response(provider, "No completion in response"))?;

    Ok(KnowledgeResponse {
        content,
        citations: response.citations,
    })
}

#[async_trait]
impl KnowledgeProvider for ChatKnowledgeProvider {
    async fn query(&self, request: &KnowledgeRequest) -> AtlasResult<KnowledgeResponse> {
        let body = self.build_request(request);
        let response: CompletionResponse = self.client.request("chat/completions", &body).await?;
        tracing::debug!(
            provider = self.client.provider_name(),
            model = %self.model,
            citations = response.citations.len(),
            "Knowledge query answered"
        );
        into_knowledge(self.client.provider_name(), response)
    }

    fn provider_name(&self) -> &str {
        self.client.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_carries_prompts() {
        let client = KnowledgeClient::new("k", 60).unwrap();
        let provider = ChatKnowledgeProvider::with_default_model(client);
        let body = provider.build_request(
            &KnowledgeRequest::new("be brief", "latest in retail")
                .with_max_tokens(256)
                .with_temperature(0.1),
        );
        assert_eq!(body.model, DEFAULT_MODEL);
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[1].content, "latest in retail");
        assert_eq!(body.max_tokens, Some(256));
    }

    #[test]
    fn test_response_with_citations() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "Answer"}, "finish_reason": "stop"}],
            "citations": ["https://a.example", "https://b.example"]
        }"#;
        let response: CompletionResponse = serde_json::from_str(json).unwrap();
        let knowledge = into_knowledge("knowledge", response).unwrap();
        assert_eq!(knowledge.content, "Answer");
        assert_eq!(knowledge.citations.len(), 2);
    }

    #[test]
    fn test_response_without_choices_is_invalid() {
        let response: CompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let err = into_knowledge("knowledge", response).unwrap_err();
        assert!(err.to_string().contains("No completion"));
    }
}
