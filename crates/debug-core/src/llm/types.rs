use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Free-form payload handed to an [`super::LlmClient`] method — the Rust
/// analogue of the original `prompt_data` dict (messages, prompt text,
/// sampling parameters, an injected `timeout`, …).
pub type PromptData = BTreeMap<String, Value>;

/// Classification of a client-side failure, used by the retry loop to
/// decide whether another attempt is worthwhile.
#[derive(Debug, Clone, Error)]
pub enum LlmCallError {
    #[error("unknown client method: {0}")]
    UnknownMethod(String),

    #[error("request timed out")]
    Timeout,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("connection reset")]
    ConnectionReset,

    #[error("server error (5xx): {0}")]
    Http5xx(u16),

    #[error("rate limited (429)")]
    Http429,

    #[error("non-retryable failure: {0}")]
    NonRetryable(String),
}

impl LlmCallError {
    /// Network timeout, connection refused/reset, HTTP 5xx, and HTTP 429
    /// are retryable; everything else (including an unknown method) is
    /// not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionRefused | Self::ConnectionReset | Self::Http5xx(_) | Self::Http429
        )
    }
}

/// Discriminated outcome of `call_llm_with_retry` / `cached_call_llm`.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmOutcome {
    Success {
        response: String,
        cached: bool,
        used_fallback: bool,
    },
    Failure {
        error: String,
        details: String,
    },
}

impl LlmOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Prefix prepended to the prompt when the `retry_simplified` fallback
/// strategy kicks in after the retry budget is exhausted.
pub const FALLBACK_PROMPT_TEMPLATE: &str =
    "The previous request could not be completed. Please provide a simplified response for: {summary}";
