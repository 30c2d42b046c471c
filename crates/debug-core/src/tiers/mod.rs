//! The three escalating repair strategies the orchestrator (C9) dispatches
//! to: a single-file quick fix, a multi-file full debug enriched with
//! related files and Chain-of-Thought context, and a strategic restart that
//! regenerates code, redesigns the plan, or rewrites the task itself.

pub mod full_debug;
pub mod quick_fix;
pub mod strategic_restart;

use std::collections::BTreeMap;

use serde_json::Value;

/// Uniform result shape returned by every tier. Mirrors the `{success,
/// description, reasoning, changes, duration_seconds, metadata}` contract
/// every tier in the source returns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TierOutcome {
    pub success: bool,
    pub description: String,
    pub reasoning: String,
    pub changes: BTreeMap<String, String>,
    pub duration_seconds: f64,
    pub metadata: BTreeMap<String, Value>,
}

impl TierOutcome {
    pub fn failure(description: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            success: false,
            description: description.into(),
            reasoning: reasoning.into(),
            ..Default::default()
        }
    }
}

/// Wraps freeform prompt text into the `PromptData` shape `LlmClient`
/// implementations expect: a `prompt` key plus a sampling `temperature`.
pub(crate) fn prompt_data(prompt: String, temperature: f64) -> BTreeMap<String, Value> {
    let mut data = BTreeMap::new();
    data.insert("prompt".to_string(), Value::String(prompt));
    data.insert("temperature".to_string(), Value::from(temperature));
    data
}

/// Renders the optional test-failure sub-block shared by the Tier 1 and
/// Tier 2 prompts.
pub(crate) fn test_failure_block(error_context: &debug_types::ErrorContext) -> String {
    let metadata = error_context.test_failure_metadata();
    if metadata.test_name.is_none() && metadata.expected.is_none() && metadata.failure_info.is_none() {
        return String::new();
    }

    let mut block = String::from("\nTest Failure Details:\n");
    if let Some(name) = &metadata.test_name {
        block.push_str(&format!("Test: {name}\n"));
    }
    if let Some(expected) = &metadata.expected {
        block.push_str(&format!("Expected: {expected}\n"));
    }
    if let Some(actual) = &metadata.actual {
        block.push_str(&format!("Actual: {actual}\n"));
    }
    if metadata.possible_bad_test {
        block.push_str("Note: this test may itself be incorrect.\n");
    }
    if let Some(info) = &metadata.failure_info {
        block.push_str(&format!("Failure info: {info}\n"));
    }
    block
}
