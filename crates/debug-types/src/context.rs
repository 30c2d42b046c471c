use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DebuggingPhase, ErrorCategory};

/// Free-form metadata a test runner attaches to a failure before it
/// reaches the classifier. When `possible_bad_test` is set the
/// orchestrator must skip Tier 1 and start at Tier 2 (full debug),
/// since a quick syntactic patch is unlikely to fix a bad assertion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestFailureMetadata {
    pub test_name: Option<String>,
    pub test_file: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub failure_category: Option<String>,
    pub possible_bad_test: bool,
    pub failure_info: Option<String>,
}

/// Snapshot of everything known about one error at the moment the
/// orchestrator decided to act on it. Owned for the lifetime of one
/// debugging episode; each `DebugAttempt` carries its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub message: String,
    pub traceback: String,
    #[serde(default)]
    pub category: ErrorCategory,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
    pub function_name: Option<String>,
    pub code_snippet: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    pub occurred_at: String,
    #[serde(default = "default_attempt_number")]
    pub attempt_number: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

fn default_attempt_number() -> u32 {
    1
}

impl ErrorContext {
    pub fn new(message: impl Into<String>, traceback: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            traceback: traceback.into(),
            category: ErrorCategory::Unknown,
            file_path: None,
            line_number: None,
            function_name: None,
            code_snippet: None,
            variables: BTreeMap::new(),
            occurred_at: Utc::now().to_rfc3339(),
            attempt_number: 1,
            metadata: BTreeMap::new(),
        }
    }

    /// Deserialized `metadata["failure_info"]`/sibling keys, reconstructed
    /// into a typed struct for the code that needs the whole bundle at
    /// once (the orchestrator's Tier 1/Tier 2 routing decision).
    pub fn test_failure_metadata(&self) -> TestFailureMetadata {
        let get_str = |key: &str| -> Option<String> {
            self.metadata.get(key).and_then(|v| v.as_str()).map(str::to_owned)
        };
        TestFailureMetadata {
            test_name: get_str("test_name"),
            test_file: get_str("test_file"),
            expected: get_str("expected"),
            actual: get_str("actual"),
            failure_category: get_str("failure_category"),
            possible_bad_test: self
                .metadata
                .get("possible_bad_test")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            failure_info: get_str("failure_info"),
        }
    }

    /// Concise one-line summary, e.g. `"SYNTAX error in foo.py at line 12: ..."`.
    pub fn summary(&self) -> String {
        let mut location = String::new();
        if let Some(path) = &self.file_path {
            location.push_str(&format!(" in {path}"));
            if let Some(line) = self.line_number {
                location.push_str(&format!(" at line {line}"));
            }
        }
        format!(
            "{} error{}: {}",
            self.category.as_str().to_ascii_uppercase(),
            location,
            self.message
        )
    }
}

/// Record of one tier's attempt to resolve an `ErrorContext`. Appended
/// once per orchestrator decision and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugAttempt {
    pub error_context: ErrorContext,
    pub phase: DebuggingPhase,
    pub fix_description: String,
    pub code_changes: BTreeMap<String, String>,
    pub success: bool,
    pub timestamp: String,
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl DebugAttempt {
    pub fn new(error_context: ErrorContext, phase: DebuggingPhase, success: bool) -> Self {
        Self {
            error_context,
            phase,
            fix_description: String::new(),
            code_changes: BTreeMap::new(),
            success,
            timestamp: Utc::now().to_rfc3339(),
            duration_seconds: 0.0,
            reasoning: String::new(),
            metadata: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn round_trips_through_json() {
        let mut ctx = ErrorContext::new("boom", "trace");
        ctx.category = ErrorCategory::Syntax;
        ctx.file_path = Some("foo.rs".into());
        ctx.line_number = Some(12);
        ctx.metadata.insert("possible_bad_test".into(), Value::Bool(true));

        let json = serde_json::to_string(&ctx).unwrap();
        let back: ErrorContext = serde_json::from_str(&json).unwrap();
        assert_eq!(ctx, back);
    }

    #[test]
    fn possible_bad_test_surfaces_through_typed_metadata() {
        let mut ctx = ErrorContext::new("assert 1 == 2", "");
        ctx.metadata.insert("possible_bad_test".into(), Value::Bool(true));
        ctx.metadata
            .insert("test_name".into(), Value::String("test_add".into()));

        let meta = ctx.test_failure_metadata();
        assert!(meta.possible_bad_test);
        assert_eq!(meta.test_name.as_deref(), Some("test_add"));
    }

    #[test]
    fn summary_includes_file_and_line_when_present() {
        let mut ctx = ErrorContext::new("oops", "");
        ctx.category = ErrorCategory::Name;
        ctx.file_path = Some("a.py".into());
        ctx.line_number = Some(3);
        assert_eq!(ctx.summary(), "NAME error in a.py at line 3: oops");
    }

    #[test]
    fn debug_attempt_round_trips() {
        let ctx = ErrorContext::new("boom", "trace");
        let mut attempt = DebugAttempt::new(ctx, DebuggingPhase::QuickFix, true);
        attempt.code_changes.insert("a.rs".into(), "fn main() {}".into());

        let json = serde_json::to_string(&attempt).unwrap();
        let back: DebugAttempt = serde_json::from_str(&json).unwrap();
        assert_eq!(attempt, back);
    }
}
