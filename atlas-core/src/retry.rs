//! Retry with exponential backoff and jitter for transient failures.
//!
//! Errors are classified by their rendered text, so a store error and a
//! provider error carrying the same signature are treated the same way.

use crate::{AtlasError, AtlasResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// HTTP status codes treated as transient. Matched as whole tokens so that
/// digits inside ids never trigger a retry.
const TRANSIENT_STATUS_CODES: [&str; 8] = ["500", "502", "503", "504", "520", "522", "524", "429"];

/// Substrings (lowercase) that mark an error as transient.
const TRANSIENT_MARKERS: [&str; 9] = [
    "rate",
    "timeout",
    "timed out",
    "reset",
    "cloudflare",
    "handshake",
    "tls",
    "ssl",
    "too many requests",
];

/// Backoff settings for one call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    /// Hard cap on a single delay, jitter included.
    pub max_delay_ms: u64,
    /// Upper bound of the uniform jitter added to each delay.
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::store_writes()
    }
}

impl RetryPolicy {
    /// Policy for database reads and writes: few retries, short delays.
    pub fn store_writes() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            max_jitter_ms: 500,
        }
    }

    /// Policy for external knowledge APIs: more retries, longer ceiling.
    pub fn external_api() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 2_000,
            max_delay_ms: 30_000,
            max_jitter_ms: 500,
        }
    }

    /// No delays at all. Tests use this.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            max_jitter_ms: 0,
        }
    }

    /// `min(initial * 2^attempt + jitter, cap)`.
    pub fn delay_for_attempt(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let exp = self
            .initial_delay_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        Duration::from_millis(exp.saturating_add(jitter_ms).min(self.max_delay_ms))
    }
}

/// Whether an error looks transient and is worth retrying.
pub fn is_transient(error: &AtlasError) -> bool {
    is_transient_message(&error.to_string())
}

/// Text classification behind [`is_transient`].
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();

    let has_code = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| TRANSIENT_STATUS_CODES.contains(&token));

    has_code || TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Run `op`, retrying transient failures according to `policy`.
///
/// Non-transient errors return immediately. After the last retry the final
/// error is returned unchanged.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> AtlasResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AtlasResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_transient(&err) {
                    return Err(err);
                }
                if attempt >= policy.max_retries {
                    tracing::warn!(
                        operation = label,
                        attempts = attempt + 1,
                        error = %err,
                        "Retries exhausted"
                    );
                    return Err(err);
                }

                let jitter = if policy.max_jitter_ms == 0 {
                    0
                } else {
                    rand::rng().random_range(0..=policy.max_jitter_ms)
                };
                let delay = policy.delay_for_attempt(attempt, jitter);
                tracing::debug!(
                    operation = label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, backing off"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}
