//! Retry/backoff/fallback call fabric sitting in front of an [`LlmClient`],
//! plus the semantic and prefix-KV caches that wrap it.

pub mod cache;
mod types;

use std::time::Duration;

use debug_types::{DebugConfig, LogLevel};
use serde_json::Value;
use tracing::{info, warn};

use crate::ports::LlmClient;
use crate::scratchpad::Scratchpad;
pub use cache::{CachedResponse, PrefixCache, SemanticCache};
pub use types::{LlmCallError, LlmOutcome, PromptData, FALLBACK_PROMPT_TEMPLATE};

fn note(scratchpad: Option<&mut Scratchpad>, message: String, is_warning: bool) {
    match scratchpad {
        Some(pad) => pad.log(
            "LLM Utils",
            &message,
            if is_warning { LogLevel::Warning } else { LogLevel::Info },
            None,
            Default::default(),
            Default::default(),
        ),
        None if is_warning => warn!("{message}"),
        None => info!("{message}"),
    }
}

/// Prepend the fallback template to whichever of `messages`/`prompt` the
/// payload carries, or fall back to a dedicated `fallback_prefix` key —
/// mirroring the original's best-effort key detection since `PromptData`
/// makes no assumption about the client's expected shape.
fn build_fallback_prompt_data(prompt_data: &PromptData, prompt_summary: &str) -> PromptData {
    let fallback_prompt = FALLBACK_PROMPT_TEMPLATE.replace("{summary}", prompt_summary);
    let mut data = prompt_data.clone();

    if let Some(Value::Array(messages)) = data.get_mut("messages") {
        let user_message = messages
            .iter_mut()
            .find(|msg| msg.get("role").and_then(Value::as_str) == Some("user"));
        if let Some(message) = user_message {
            if let Some(content) = message.get("content").and_then(Value::as_str) {
                let merged = format!("{fallback_prompt}\n\n{content}");
                message["content"] = Value::String(merged);
            }
        }
        return data;
    }

    if let Some(Value::String(prompt)) = data.get("prompt").cloned() {
        data.insert("prompt".to_string(), Value::String(format!("{fallback_prompt}\n\n{prompt}")));
        return data;
    }

    data.insert("fallback_prefix".to_string(), Value::String(fallback_prompt));
    data
}

/// Call `method_name` on `client` with retry, exponential backoff, and an
/// optional one-shot simplified-prompt fallback once the retry budget is
/// exhausted. Never panics; every failure path returns
/// [`LlmOutcome::Failure`].
pub async fn call_llm_with_retry(
    client: &dyn LlmClient,
    method_name: &str,
    prompt_data: &PromptData,
    config: &DebugConfig,
    mut scratchpad: Option<&mut Scratchpad>,
    prompt_summary: &str,
) -> LlmOutcome {
    let timeout = prompt_data
        .get("timeout")
        .and_then(Value::as_f64)
        .unwrap_or(config.llm_default_timeout);
    let max_retries = config.llm_max_retries.max(1);

    let mut last_error: Option<LlmCallError> = None;

    for attempt in 0..max_retries {
        note(
            scratchpad.as_deref_mut(),
            format!("Attempt {}/{max_retries} - calling LLM API via {method_name}", attempt + 1),
            false,
        );

        let mut call_data = prompt_data.clone();
        call_data.insert("timeout".to_string(), Value::from(timeout));

        match client.call(method_name, &call_data).await {
            Ok(response) => {
                note(scratchpad.as_deref_mut(), format!("LLM API call succeeded on attempt {}", attempt + 1), false);
                return LlmOutcome::Success {
                    response,
                    cached: false,
                    used_fallback: false,
                };
            }
            Err(err) if err.is_retryable() => {
                if attempt + 1 < max_retries {
                    let backoff = config.llm_initial_backoff * config.llm_backoff_factor.powi(attempt as i32);
                    note(scratchpad.as_deref_mut(), format!("Retryable error: {err}. Retrying in {backoff:.2}s"), false);
                    tokio::time::sleep(Duration::from_secs_f64(backoff.max(0.0))).await;
                    last_error = Some(err);
                } else {
                    note(scratchpad.as_deref_mut(), format!("Failed after {max_retries} attempts with error: {err}"), true);
                    last_error = Some(err);
                    break;
                }
            }
            Err(err) => {
                note(scratchpad.as_deref_mut(), format!("Non-retryable error: {err}"), true);
                last_error = Some(err);
                break;
            }
        }
    }

    if config.llm_fallback_strategy == "retry_simplified" {
        note(scratchpad.as_deref_mut(), "Attempting fallback with simplified prompt".to_string(), false);

        let fallback_data = build_fallback_prompt_data(prompt_data, prompt_summary);
        match client.call(method_name, &fallback_data).await {
            Ok(response) => {
                note(scratchpad.as_deref_mut(), "Fallback LLM API call succeeded".to_string(), false);
                return LlmOutcome::Success {
                    response,
                    cached: false,
                    used_fallback: true,
                };
            }
            Err(err) => {
                note(scratchpad.as_deref_mut(), format!("Fallback strategy failed with error: {err}"), true);
                last_error = Some(err);
            }
        }
    }

    note(scratchpad.as_deref_mut(), "All recovery attempts failed".to_string(), true);

    let used_fallback_strategy = config.llm_fallback_strategy != "none";
    let error = format!(
        "LLM API call failed after {max_retries} attempts{}",
        if used_fallback_strategy { " and fallback" } else { "" }
    );
    let details = match last_error {
        Some(err) => format!("Last error: {err}"),
        None => "no attempts were made".to_string(),
    };
    LlmOutcome::Failure { error, details }
}

/// Semantic-cache-then-prefix-cache-then-retry wrapper. Single-flight is
/// enforced by locking on the prompt's fingerprint before consulting the
/// cache, so a concurrent caller for the same prompt blocks until the first
/// caller has populated the entry rather than triggering a duplicate call.
#[allow(clippy::too_many_arguments)]
pub async fn cached_call_llm(
    prompt: &str,
    client: &dyn LlmClient,
    method_name: &str,
    prompt_data: &PromptData,
    config: &DebugConfig,
    semantic_cache: &SemanticCache,
    prefix_cache: &PrefixCache,
    scratchpad: Option<&mut Scratchpad>,
    prompt_summary: &str,
) -> LlmOutcome {
    let guard = semantic_cache.lock_for(prompt);
    let _permit = guard.lock().await;

    if let Some(cached) = semantic_cache.get(prompt) {
        return LlmOutcome::Success {
            response: cached.response,
            cached: true,
            used_fallback: false,
        };
    }

    if let Some(kv_handle) = prefix_cache.get(prompt, config.prefix_cache_token_window) {
        client.attach_kv_hint(&kv_handle);
    }

    let outcome = call_llm_with_retry(client, method_name, prompt_data, config, scratchpad, prompt_summary).await;

    if let LlmOutcome::Success { response, .. } = &outcome {
        semantic_cache.insert(
            prompt,
            CachedResponse {
                response: response.clone(),
                kv_handle: None,
            },
        );
    }

    outcome
}

/// Optional out-of-process transport: POSTs `payload` to a Supabase edge
/// function, attaching a bearer token when `github_oauth_token` is
/// configured.
pub async fn call_llm_via_supabase(payload: &Value, config: &DebugConfig) -> Result<Value, LlmCallError> {
    let base_url = config
        .supabase_base_url
        .as_deref()
        .ok_or_else(|| LlmCallError::NonRetryable("no supabase_base_url configured".to_string()))?;
    let url = format!("{}/functions/v1/debug-engine", base_url.trim_end_matches('/'));

    let client = reqwest::Client::new();
    let mut request = client
        .post(&url)
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs_f64(config.llm_default_timeout))
        .json(payload);

    if let Some(token) = &config.github_oauth_token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await.map_err(classify_reqwest_error)?;
    let status = response.status();
    if status.as_u16() == 429 {
        return Err(LlmCallError::Http429);
    }
    if status.is_server_error() {
        return Err(LlmCallError::Http5xx(status.as_u16()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmCallError::NonRetryable(format!("supabase call failed ({status}): {body}")));
    }

    response
        .json::<Value>()
        .await
        .map_err(|err| LlmCallError::NonRetryable(format!("invalid JSON response: {err}")))
}

fn classify_reqwest_error(err: reqwest::Error) -> LlmCallError {
    if err.is_timeout() {
        return LlmCallError::Timeout;
    }
    if err.is_connect() {
        return LlmCallError::ConnectionRefused;
    }
    LlmCallError::NonRetryable(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;

    struct ScriptedClient {
        responses: Mutex<Vec<Result<String, LlmCallError>>>,
        calls: Arc<Mutex<Vec<PromptData>>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn call(&self, _method_name: &str, prompt_data: &PromptData) -> Result<String, LlmCallError> {
            self.calls.lock().await.push(prompt_data.clone());
            let mut responses = self.responses.lock().await;
            if responses.is_empty() {
                return Err(LlmCallError::NonRetryable("exhausted script".into()));
            }
            responses.remove(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_without_retry_on_first_success() {
        let client = ScriptedClient {
            responses: Mutex::new(vec![Ok("done".to_string())]),
            calls: Arc::new(Mutex::new(Vec::new())),
        };
        let config = DebugConfig::default();
        let outcome = call_llm_with_retry(&client, "generate", &PromptData::new(), &config, None, "summary").await;
        assert_eq!(
            outcome,
            LlmOutcome::Success {
                response: "done".to_string(),
                cached: false,
                used_fallback: false
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retries_on_transient_errors_then_succeeds() {
        let client = ScriptedClient {
            responses: Mutex::new(vec![Err(LlmCallError::Timeout), Err(LlmCallError::Http5xx(503)), Ok("ok".to_string())]),
            calls: Arc::new(Mutex::new(Vec::new())),
        };
        let mut config = DebugConfig::default();
        config.llm_max_retries = 3;
        config.llm_initial_backoff = 1.0;
        config.llm_backoff_factor = 2.0;

        let handle = tokio::spawn(async move {
            call_llm_with_retry(&client, "generate", &PromptData::new(), &config, None, "summary").await
        });
        tokio::time::advance(Duration::from_secs(10)).await;
        let outcome = handle.await.unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_after_exhausting_retries() {
        let client = ScriptedClient {
            responses: Mutex::new(vec![Err(LlmCallError::Timeout), Ok("ok".to_string())]),
            calls: Arc::new(Mutex::new(Vec::new())),
        };
        let mut config = DebugConfig::default();
        config.llm_max_retries = 1;
        config.llm_fallback_strategy = "retry_simplified".to_string();

        let outcome = call_llm_with_retry(&client, "generate", &PromptData::new(), &config, None, "fix the bug").await;
        assert_eq!(
            outcome,
            LlmOutcome::Success {
                response: "ok".to_string(),
                cached: false,
                used_fallback: true
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_does_not_retry() {
        let client = ScriptedClient {
            responses: Mutex::new(vec![Err(LlmCallError::NonRetryable("bad request".into())), Ok("unreachable".to_string())]),
            calls: Arc::new(Mutex::new(Vec::new())),
        };
        let mut config = DebugConfig::default();
        config.llm_max_retries = 3;

        let outcome = call_llm_with_retry(&client, "generate", &PromptData::new(), &config, None, "summary").await;
        assert!(!outcome.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn cached_call_llm_returns_cache_hit_without_calling_client() {
        let client = ScriptedClient {
            responses: Mutex::new(vec![Ok("fresh".to_string())]),
            calls: Arc::new(Mutex::new(Vec::new())),
        };
        let config = DebugConfig::default();
        let semantic_cache = SemanticCache::new(8);
        let prefix_cache = PrefixCache::new(8);

        let first = cached_call_llm(
            "fix this bug",
            &client,
            "generate",
            &PromptData::new(),
            &config,
            &semantic_cache,
            &prefix_cache,
            None,
            "summary",
        )
        .await;
        assert!(first.is_success());

        let second = cached_call_llm(
            "fix this bug",
            &client,
            "generate",
            &PromptData::new(),
            &config,
            &semantic_cache,
            &prefix_cache,
            None,
            "summary",
        )
        .await;
        assert_eq!(
            second,
            LlmOutcome::Success {
                response: "fresh".to_string(),
                cached: true,
                used_fallback: false
            }
        );
        assert_eq!(client.calls.lock().await.len(), 1);
    }
}
