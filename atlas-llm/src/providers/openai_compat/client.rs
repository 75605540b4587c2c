//! HTTP client for OpenAI-compatible chat endpoints, with request pacing

use super::types::ApiError;
use crate::providers::{invalid_response, rate_limited, request_failed, transport};
use atlas_core::{AtlasError, AtlasResult};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Default endpoint: a search-backed chat-completions API.
pub const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Chat-completions client with rate limiting.
pub struct KnowledgeClient {
    client: Client,
    provider: String,
    api_key: String,
    base_url: String,
    rate_limiter: Arc<Semaphore>,
    last_request: Arc<AtomicU64>,
    min_request_interval_ms: u64,
    start_time: Instant,
}

impl KnowledgeClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `api_key` - Bearer token for the endpoint
    /// * `requests_per_minute` - Maximum requests per minute
    pub fn new(api_key: impl Into<String>, requests_per_minute: u32) -> AtlasResult<Self> {
        let rpm = requests_per_minute.max(1);
        let min_interval_ms = (60_000 / rpm as u64).max(10);
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| transport("knowledge", format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            provider: "knowledge".to_string(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            rate_limiter: Arc::new(Semaphore::new(rpm as usize)),
            last_request: Arc::new(AtomicU64::new(0)),
            min_request_interval_ms: min_interval_ms,
            start_time: Instant::now(),
        })
    }

    /// Point at a different OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Name used in errors and logs.
    pub fn with_provider_name(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn provider_name(&self) -> &str {
        &self.provider
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    /// POST `body` to `endpoint` with pacing applied.
    pub async fn request<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> AtlasResult<Res> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| request_failed(&self.provider, 0, format!("Rate limiter closed: {}", e)))?;

        // Enforce minimum interval between requests
        let now_ms = self.start_time.elapsed().as_millis() as u64;
        let last_ms = self.last_request.load(Ordering::Relaxed);
        let elapsed = now_ms.saturating_sub(last_ms);
        if last_ms > 0 && elapsed < self.min_request_interval_ms {
            tokio::time::sleep(Duration::from_millis(self.min_request_interval_ms - elapsed)).await;
        }
        self.last_request
            .store(self.start_time.elapsed().as_millis().max(1) as u64, Ordering::Relaxed);

        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| {
                invalid_response(&self.provider, format!("Failed to parse response: {}", e))
            });
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(error_for_status(&self.provider, status, &error_text))
    }

    fn transport_error(&self, err: &reqwest::Error) -> AtlasError {
        if err.is_timeout() {
            transport(&self.provider, format!("request timed out: {}", err))
        } else if err.is_connect() {
            transport(&self.provider, format!("connection reset or refused: {}", err))
        } else {
            transport(&self.provider, err.to_string())
        }
    }
}

/// Map a non-success status and body to an error whose text the retry
/// utility classifies: 429 and 5xx carry their status code.
pub fn error_for_status(provider: &str, status: StatusCode, body: &str) -> AtlasError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return rate_limited(provider);
    }
    let message = match serde_json::from_str::<ApiError>(body) {
        Ok(api_error) => api_error.error.message,
        Err(_) => body.chars().take(500).collect(),
    };
    request_failed(provider, status.as_u16(), message)
}

impl std::fmt::Debug for KnowledgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
