//! C9: owns one debugging episode's lifecycle — classifying the incoming
//! error, deciding which tier gets to attempt a fix, recording the outcome,
//! and folding confirmed categories back into the pattern store.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;

use debug_types::{
    DebugAttempt, DebugConfig, DebuggingPhase, ErrorCategory, ErrorContext,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::classifier::{categorize_error, is_similar_error};
use crate::llm::{PrefixCache, SemanticCache};
use crate::pattern_store::PatternStore;
use crate::ports::{CodeGenerator, FileSystem, LlmClient, Planner};
use crate::scratchpad::Scratchpad;
use crate::tiers::{full_debug, quick_fix, strategic_restart, TierOutcome};

/// Read-only report produced by [`Orchestrator::analyze_error`]: a
/// classification plus the orchestrator's recommendation, without
/// mutating episode state.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub context: ErrorContext,
    pub severity: &'static str,
    pub fix_approach: &'static str,
    pub recommended_tier: DebuggingPhase,
    pub similar_history: Vec<DebugAttempt>,
}

/// Aggregate counters derived from the recorded attempt history.
#[derive(Debug, Clone, Default)]
pub struct DebugStats {
    pub total_attempts: usize,
    pub successes: usize,
    pub failures: usize,
    pub by_phase: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
}

/// Owns the episode state described in spec §4.9: the current error (if
/// any), per-tier attempt counters, the full attempt history, and the
/// mutable task/plan pair Tier 3 reads and rewrites.
pub struct Orchestrator {
    pattern_store: PatternStore,
    config: DebugConfig,
    semantic_cache: SemanticCache,
    prefix_cache: PrefixCache,

    current_task: String,
    current_plan: Option<String>,
    tech_stack: String,

    current_error: Option<ErrorContext>,
    generator_attempts: u32,
    debugger_attempts: u32,
    restart_attempts: u32,

    debug_history: Vec<DebugAttempt>,
}

impl Orchestrator {
    pub fn new(pattern_store: PatternStore, config: DebugConfig, current_task: impl Into<String>, tech_stack: impl Into<String>) -> Self {
        let semantic_cache = SemanticCache::new(config.semantic_cache_max_entries);
        let prefix_cache = PrefixCache::new(config.prefix_cache_max_entries);
        Self {
            pattern_store,
            config,
            semantic_cache,
            prefix_cache,
            current_task: current_task.into(),
            current_plan: None,
            tech_stack: tech_stack.into(),
            current_error: None,
            generator_attempts: 0,
            debugger_attempts: 0,
            restart_attempts: 0,
            debug_history: Vec::new(),
        }
    }

    pub fn set_plan(&mut self, plan: impl Into<String>) {
        self.current_plan = Some(plan.into());
    }

    pub fn current_plan(&self) -> Option<&str> {
        self.current_plan.as_deref()
    }

    pub fn current_task(&self) -> &str {
        &self.current_task
    }

    pub fn get_error_history(&self) -> &[DebugAttempt] {
        &self.debug_history
    }

    pub fn get_debug_stats(&self) -> DebugStats {
        let mut stats = DebugStats::default();
        stats.total_attempts = self.debug_history.len();
        for attempt in &self.debug_history {
            if attempt.success {
                stats.successes += 1;
            } else {
                stats.failures += 1;
            }
            *stats.by_phase.entry(attempt.phase.as_str().to_string()).or_insert(0) += 1;
            *stats
                .by_category
                .entry(attempt.error_context.category.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats
    }

    /// Classify and score an error without touching episode state — used
    /// by callers that want a recommendation before committing to
    /// `handle_error`.
    pub fn analyze_error(
        &self,
        message: &str,
        traceback: &str,
        file_path: Option<&str>,
        line_number: Option<u32>,
    ) -> AnalysisReport {
        let category = categorize_error(message, traceback, &self.pattern_store);
        let mut context = ErrorContext::new(message, traceback);
        context.category = category;
        context.file_path = file_path.map(str::to_string);
        context.line_number = line_number;

        let severity = match category {
            ErrorCategory::Memory | ErrorCategory::Permission | ErrorCategory::Network | ErrorCategory::Database => "high",
            ErrorCategory::Runtime | ErrorCategory::Assertion | ErrorCategory::Type | ErrorCategory::Attribute => "medium",
            _ => "low",
        };

        let fix_approach = match category {
            ErrorCategory::Unknown => "unknown",
            ErrorCategory::Permission | ErrorCategory::Network | ErrorCategory::Database | ErrorCategory::Memory => {
                "environment_fix"
            }
            _ => "code_fix",
        };

        let recommended_tier = if context.test_failure_metadata().possible_bad_test {
            DebuggingPhase::FullDebug
        } else if self.generator_attempts < self.config.max_generator_attempts {
            DebuggingPhase::QuickFix
        } else if self.debugger_attempts < self.config.max_debugger_attempts {
            DebuggingPhase::FullDebug
        } else {
            DebuggingPhase::StrategicRestart
        };

        let similar_history: Vec<DebugAttempt> = self
            .debug_history
            .iter()
            .filter(|attempt| is_similar_error(&attempt.error_context, &context))
            .cloned()
            .collect();

        AnalysisReport {
            context,
            severity,
            fix_approach,
            recommended_tier,
            similar_history,
        }
    }

    /// True iff the file exists and either the category is debuggable
    /// with a non-empty message, or a similar prior attempt already
    /// succeeded.
    pub async fn can_debug_error(&self, fs: &dyn FileSystem, message: &str, file_path: Option<&str>) -> bool {
        let Some(file_path) = file_path else {
            return false;
        };
        if !fs.exists(Path::new(file_path)).await {
            return false;
        }

        let category = categorize_error(message, "", &self.pattern_store);
        let debuggable = !matches!(category, ErrorCategory::Unknown | ErrorCategory::Permission) && !message.trim().is_empty();
        if debuggable {
            return true;
        }

        let mut probe = ErrorContext::new(message, "");
        probe.category = category;
        probe.file_path = Some(file_path.to_string());
        self.debug_history
            .iter()
            .any(|attempt| attempt.success && is_similar_error(&attempt.error_context, &probe))
    }

    /// Convenience shim over `handle_error` for the common case of a
    /// single-file runtime failure with an already-known location.
    #[allow(clippy::too_many_arguments)]
    pub async fn debug_error(
        &mut self,
        fs: &dyn FileSystem,
        llm: &dyn LlmClient,
        planner: &dyn Planner,
        code_generator: &dyn CodeGenerator,
        scratchpad: Option<&mut Scratchpad>,
        message: &str,
        file_path: &str,
        line_number: Option<u32>,
        traceback: Option<&str>,
    ) -> TierOutcome {
        self.handle_error(
            fs,
            llm,
            planner,
            code_generator,
            scratchpad,
            message,
            traceback.unwrap_or(""),
            Some(file_path),
            line_number,
            None,
            None,
            BTreeMap::new(),
            BTreeMap::new(),
            None,
        )
        .await
    }

    /// Entry point used by the code-gen validation loop (C10) once its own
    /// refinement budget is exhausted: routes the validation issue through
    /// the normal episode machinery so it benefits from tier escalation and
    /// history tracking like any other failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn debug_generation_issue(
        &mut self,
        fs: &dyn FileSystem,
        llm: &dyn LlmClient,
        planner: &dyn Planner,
        code_generator: &dyn CodeGenerator,
        scratchpad: Option<&mut Scratchpad>,
        file_path: &str,
        issue_info: &str,
        label: &str,
    ) -> TierOutcome {
        let message = format!("{label}: {issue_info}");
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), Value::String("codegen_validation".to_string()));
        metadata.insert("label".to_string(), Value::String(label.to_string()));

        self.handle_error(
            fs,
            llm,
            planner,
            code_generator,
            scratchpad,
            &message,
            "",
            Some(file_path),
            None,
            None,
            None,
            BTreeMap::new(),
            metadata,
            None,
        )
        .await
    }

    /// Core episode step, spec §4.9: classify, decide tier, dispatch,
    /// record, and fold a success back into the pattern store.
    #[allow(clippy::too_many_arguments)]
    pub async fn handle_error(
        &mut self,
        fs: &dyn FileSystem,
        llm: &dyn LlmClient,
        planner: &dyn Planner,
        code_generator: &dyn CodeGenerator,
        mut scratchpad: Option<&mut Scratchpad>,
        message: &str,
        traceback: &str,
        file_path: Option<&str>,
        line_number: Option<u32>,
        function_name: Option<&str>,
        code_snippet: Option<&str>,
        variables: BTreeMap<String, String>,
        metadata: BTreeMap<String, Value>,
        cancel: Option<&CancellationToken>,
    ) -> TierOutcome {
        if cancel.map(CancellationToken::is_cancelled).unwrap_or(false) {
            return TierOutcome::failure("cancelled", "Episode cancelled before it could begin.");
        }

        if let Some(pad) = scratchpad.as_deref_mut() {
            pad.start_section(debug_types::Section::Error);
        }

        let category = categorize_error(message, traceback, &self.pattern_store);
        let mut context = ErrorContext::new(message, traceback);
        context.category = category;
        context.file_path = file_path.map(str::to_string);
        context.line_number = line_number;
        context.function_name = function_name.map(str::to_string);
        context.code_snippet = code_snippet.map(str::to_string);
        context.variables = variables;
        context.metadata = metadata;

        let bad_test_branch = context.test_failure_metadata().possible_bad_test;
        if bad_test_branch {
            if let Some(pad) = scratchpad.as_deref_mut() {
                pad.log(
                    "DebuggingManager",
                    "Possible bad test detected - skipping Tier 1 and starting at full debug",
                    debug_types::LogLevel::Warning,
                    Some(debug_types::Section::Error),
                    Default::default(),
                    Default::default(),
                );
            }
        }

        let is_similar = self
            .current_error
            .as_ref()
            .map(|current| is_similar_error(current, &context))
            .unwrap_or(false);

        if is_similar {
            context.attempt_number = self.current_error.as_ref().map(|c| c.attempt_number).unwrap_or(0) + 1;
        } else {
            self.generator_attempts = 0;
            self.debugger_attempts = 0;
            self.restart_attempts = 0;
        }
        self.current_error = Some(context.clone());

        let phase = if bad_test_branch {
            if self.debugger_attempts < self.config.max_debugger_attempts {
                DebuggingPhase::FullDebug
            } else if self.restart_attempts < self.config.max_restart_attempts {
                DebuggingPhase::StrategicRestart
            } else {
                return self.exhausted(scratchpad);
            }
        } else if self.generator_attempts < self.config.max_generator_attempts {
            DebuggingPhase::QuickFix
        } else if self.debugger_attempts < self.config.max_debugger_attempts {
            DebuggingPhase::FullDebug
        } else if self.restart_attempts < self.config.max_restart_attempts {
            DebuggingPhase::StrategicRestart
        } else {
            return self.exhausted(scratchpad);
        };

        let prospective_attempt = match phase {
            DebuggingPhase::QuickFix => self.generator_attempts + 1,
            DebuggingPhase::FullDebug => self.debugger_attempts + 1,
            DebuggingPhase::StrategicRestart => self.restart_attempts + 1,
            DebuggingPhase::Analysis => 0,
        };

        let outcome = match phase {
            DebuggingPhase::QuickFix => {
                run_cancellable(
                    quick_fix::execute_quick_fix(
                        &context,
                        fs,
                        llm,
                        &self.config,
                        &self.semantic_cache,
                        &self.prefix_cache,
                        scratchpad.as_deref_mut(),
                        prospective_attempt,
                    ),
                    cancel,
                )
                .await
            }
            DebuggingPhase::FullDebug => {
                run_cancellable(
                    full_debug::execute_full_debug(
                        &context,
                        fs,
                        llm,
                        &self.config,
                        &self.semantic_cache,
                        &self.prefix_cache,
                        scratchpad.as_deref_mut(),
                        prospective_attempt,
                    ),
                    cancel,
                )
                .await
            }
            DebuggingPhase::StrategicRestart => {
                let mut restart_ctx = strategic_restart::RestartContext {
                    current_task: &mut self.current_task,
                    current_plan: &mut self.current_plan,
                    tech_stack: &self.tech_stack,
                };
                run_cancellable(
                    strategic_restart::execute_strategic_restart(
                        &context,
                        &self.debug_history,
                        fs,
                        llm,
                        planner,
                        code_generator,
                        &self.config,
                        &self.semantic_cache,
                        &self.prefix_cache,
                        scratchpad.as_deref_mut(),
                        &mut restart_ctx,
                    ),
                    cancel,
                )
                .await
            }
            DebuggingPhase::Analysis => TierOutcome::failure("analysis phase has no executable tier", ""),
        };

        if outcome.description == "cancelled" {
            if let Some(pad) = scratchpad.as_deref_mut() {
                pad.end_section(Some(debug_types::Section::Error));
            }
            return outcome;
        }

        match phase {
            DebuggingPhase::QuickFix => self.generator_attempts = prospective_attempt,
            DebuggingPhase::FullDebug => self.debugger_attempts = prospective_attempt,
            DebuggingPhase::StrategicRestart => self.restart_attempts = prospective_attempt,
            DebuggingPhase::Analysis => {}
        }

        let mut attempt = DebugAttempt::new(context.clone(), phase, outcome.success);
        attempt.fix_description = outcome.description.clone();
        attempt.reasoning = outcome.reasoning.clone();
        attempt.code_changes = outcome.changes.clone();
        attempt.duration_seconds = outcome.duration_seconds;
        attempt.metadata = outcome.metadata.clone();
        self.debug_history.push(attempt);

        if outcome.success {
            let category_name = category.as_str().to_ascii_uppercase();
            if let Err(err) = self.pattern_store.update(message, &category_name) {
                warn!(error = %err, "failed to persist confirmed category to pattern store");
            }
            self.current_error = None;
            self.generator_attempts = 0;
            self.debugger_attempts = 0;
            self.restart_attempts = 0;
        }

        if let Some(pad) = scratchpad.as_deref_mut() {
            pad.end_section(Some(debug_types::Section::Error));
        }

        outcome
    }

    fn exhausted(&mut self, mut scratchpad: Option<&mut Scratchpad>) -> TierOutcome {
        if let Some(pad) = scratchpad.as_deref_mut() {
            pad.log(
                "DebuggingManager",
                "All tier budgets have been consumed for this error",
                debug_types::LogLevel::Error,
                Some(debug_types::Section::Error),
                Default::default(),
                Default::default(),
            );
            pad.end_section(Some(debug_types::Section::Error));
        }
        TierOutcome::failure("exhausted", "All tier budgets have been consumed for this error.")
    }
}

async fn run_cancellable(tier_future: impl Future<Output = TierOutcome>, cancel: Option<&CancellationToken>) -> TierOutcome {
    match cancel {
        Some(token) => {
            tokio::select! {
                outcome = tier_future => outcome,
                _ = token.cancelled() => TierOutcome::failure("cancelled", "the debugging episode was cancelled"),
            }
        }
        None => tier_future.await,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::llm::LlmCallError;
    use crate::ports::test_doubles::{InMemoryFileSystem, ScriptedLlmClient};

    fn orchestrator() -> (Orchestrator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = PatternStore::load(dir.path().join("patterns.json"));
        let mut config = DebugConfig::default();
        config.max_generator_attempts = 2;
        config.max_debugger_attempts = 3;
        config.max_restart_attempts = 2;
        (Orchestrator::new(store, config, "build a thing", "python"), dir)
    }

    struct NoopPlanner;
    #[async_trait::async_trait]
    impl Planner for NoopPlanner {
        async fn generate_plan(&self, _task: &str, _context: Option<&BTreeMap<String, String>>) -> crate::ports::PlanResult {
            crate::ports::PlanResult {
                success: true,
                plan: "new plan".to_string(),
            }
        }
    }

    struct NoopCodeGenerator;
    #[async_trait::async_trait]
    impl CodeGenerator for NoopCodeGenerator {
        async fn generate_code(
            &self,
            _task: &str,
            _plan: &str,
            _tech_stack: &str,
            _max_token_count: Option<u32>,
        ) -> crate::ports::CodeGenResult {
            crate::ports::CodeGenResult {
                success: true,
                files: BTreeMap::from([("broken.py".to_string(), "fixed".to_string())]),
            }
        }
    }

    #[tokio::test]
    async fn escalates_across_tiers_for_repeated_similar_failures() {
        let (mut orchestrator, _dir) = orchestrator();
        let fs = InMemoryFileSystem::with_file("broken.py", "def f(:\n");
        let planner = NoopPlanner;
        let code_generator = NoopCodeGenerator;

        let mut observed_phases = Vec::new();
        for _ in 0..6 {
            let llm = ScriptedLlmClient::new(vec![Err(LlmCallError::NonRetryable("always fails".into()))]);
            let outcome = orchestrator
                .handle_error(
                    &fs,
                    &llm,
                    &planner,
                    &code_generator,
                    None,
                    "SyntaxError: invalid syntax",
                    "",
                    Some("broken.py"),
                    Some(1),
                    None,
                    None,
                    BTreeMap::new(),
                    BTreeMap::new(),
                    None,
                )
                .await;
            assert!(!outcome.success);
            observed_phases.push(orchestrator.get_error_history().last().unwrap().phase);
        }

        use DebuggingPhase::*;
        assert_eq!(
            observed_phases,
            vec![QuickFix, QuickFix, FullDebug, FullDebug, FullDebug, StrategicRestart]
        );
    }

    #[tokio::test]
    async fn exhausts_after_all_tier_budgets_are_spent() {
        let (mut orchestrator, _dir) = orchestrator();
        let fs = InMemoryFileSystem::with_file("broken.py", "def f(:\n");
        let planner = NoopPlanner;
        let code_generator = NoopCodeGenerator;

        for _ in 0..7 {
            let llm = ScriptedLlmClient::new(vec![Err(LlmCallError::NonRetryable("always fails".into()))]);
            let _ = orchestrator
                .handle_error(
                    &fs,
                    &llm,
                    &planner,
                    &code_generator,
                    None,
                    "SyntaxError: invalid syntax",
                    "",
                    Some("broken.py"),
                    Some(1),
                    None,
                    None,
                    BTreeMap::new(),
                    BTreeMap::new(),
                    None,
                )
                .await;
        }

        let llm = ScriptedLlmClient::new(vec![]);
        let outcome = orchestrator
            .handle_error(
                &fs,
                &llm,
                &planner,
                &code_generator,
                None,
                "SyntaxError: invalid syntax",
                "",
                Some("broken.py"),
                Some(1),
                None,
                None,
                BTreeMap::new(),
                BTreeMap::new(),
                None,
            )
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.description, "exhausted");
    }

    #[tokio::test]
    async fn success_clears_current_error_and_resets_counters() {
        let (mut orchestrator, _dir) = orchestrator();
        let fs = InMemoryFileSystem::with_file("broken.py", "def f(:\n    pass\n");
        let llm = ScriptedLlmClient::new(vec![Ok("## Fix\n```python\ndef f():\n    pass\n```\n".to_string())]);
        let planner = NoopPlanner;
        let code_generator = NoopCodeGenerator;

        let outcome = orchestrator
            .handle_error(
                &fs,
                &llm,
                &planner,
                &code_generator,
                None,
                "SyntaxError: invalid syntax",
                "",
                Some("broken.py"),
                Some(1),
                None,
                None,
                BTreeMap::new(),
                BTreeMap::new(),
                None,
            )
            .await;

        assert!(outcome.success);
        assert!(orchestrator.current_error.is_none());
        assert_eq!(orchestrator.generator_attempts, 0);
    }

    #[tokio::test]
    async fn bad_test_metadata_skips_tier_one() {
        let (mut orchestrator, _dir) = orchestrator();
        let fs = InMemoryFileSystem::with_file("broken.py", "assert 1 == 2\n");
        let llm = ScriptedLlmClient::new(vec![Ok(
            "```filepath:broken.py\nassert 1 == 1\n```\n".to_string(),
        )]);
        let planner = NoopPlanner;
        let code_generator = NoopCodeGenerator;

        let mut metadata = BTreeMap::new();
        metadata.insert("possible_bad_test".to_string(), Value::Bool(true));

        let outcome = orchestrator
            .handle_error(
                &fs,
                &llm,
                &planner,
                &code_generator,
                None,
                "AssertionError: 1 != 2",
                "",
                Some("broken.py"),
                Some(1),
                None,
                None,
                BTreeMap::new(),
                metadata,
                None,
            )
            .await;

        assert!(outcome.success);
        let attempt = orchestrator.get_error_history().first().unwrap();
        assert_eq!(attempt.phase, DebuggingPhase::FullDebug);
    }

    #[tokio::test]
    async fn cancellation_returns_without_recording_an_attempt() {
        let (mut orchestrator, _dir) = orchestrator();
        let fs = InMemoryFileSystem::with_file("broken.py", "def f(:\n    pass\n");
        let llm = ScriptedLlmClient::new(vec![]);
        let planner = NoopPlanner;
        let code_generator = NoopCodeGenerator;

        let token = CancellationToken::new();
        token.cancel();

        let outcome = orchestrator
            .handle_error(
                &fs,
                &llm,
                &planner,
                &code_generator,
                None,
                "SyntaxError: invalid syntax",
                "",
                Some("broken.py"),
                Some(1),
                None,
                None,
                BTreeMap::new(),
                BTreeMap::new(),
                Some(&token),
            )
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.description, "cancelled");
        assert!(orchestrator.get_error_history().is_empty());
    }

    #[test]
    fn analyze_error_derives_severity_and_fix_approach() {
        let (orchestrator, _dir) = orchestrator();
        let report = orchestrator.analyze_error("ConnectionRefusedError", "", Some("net.py"), None);
        assert_eq!(report.severity, "high");
        assert_eq!(report.fix_approach, "environment_fix");
        assert_eq!(report.recommended_tier, DebuggingPhase::QuickFix);
    }
}
