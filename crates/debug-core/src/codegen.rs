//! C10: per-file generate → validate → refine loop, falling back to the
//! debugging orchestrator once the in-loop refinement budget is spent, and
//! finishing with a test-suite-gated refinement pass.

use std::collections::BTreeMap;
use std::time::Duration;

use debug_types::DebugConfig;
use tracing::{info, warn};

use crate::orchestrator::Orchestrator;
use crate::ports::{CodeGenerator, FileSystem, LlmClient, Planner, ShellRunner};

/// One function/type the plan asks a file to contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplementationDetail {
    pub function_name: String,
    pub signature: Option<String>,
    pub description: String,
    pub imports: Vec<String>,
}

/// Keyed by file path, the set of details the generator must satisfy for
/// that file.
pub type ImplementationPlan = BTreeMap<String, Vec<ImplementationDetail>>;

/// Coarse bucket a validation issue falls into, used to pick a label for
/// `Orchestrator::debug_generation_issue`. Distinct from the error
/// classifier's taxonomy: generation-time issues don't carry a traceback
/// to run the regex table against, and some buckets here (`Lint`, `Test`)
/// have no analogue in that taxonomy at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Syntax,
    Import,
    Undefined,
    Lint,
    Type,
    Test,
    Other,
}

impl IssueKind {
    pub fn label(self) -> &'static str {
        match self {
            IssueKind::Syntax => "syntax_error",
            IssueKind::Import => "import_error",
            IssueKind::Undefined => "undefined_name",
            IssueKind::Lint => "lint_issue",
            IssueKind::Type => "type_error",
            IssueKind::Test => "test_failure",
            IssueKind::Other => "other_issue",
        }
    }
}

/// Heuristic classification of one validator's complaint text. Checked in
/// a fixed, most-specific-first order so "undefined name 'x'" doesn't get
/// swallowed by a looser "name" match.
pub fn classify_issue(message: &str) -> IssueKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("syntaxerror") || lower.contains("unexpected token") || lower.contains("unbalanced") {
        IssueKind::Syntax
    } else if lower.contains("importerror") || lower.contains("modulenotfounderror") || lower.contains("no module named") {
        IssueKind::Import
    } else if lower.contains("nameerror") || lower.contains("undefined") || lower.contains("is not defined") {
        IssueKind::Undefined
    } else if lower.contains("typeerror") || lower.contains("type mismatch") || lower.contains("expected type") {
        IssueKind::Type
    } else if lower.contains("test failed") || lower.contains("assertionerror") || lower.contains("failed tests") {
        IssueKind::Test
    } else if lower.contains("lint") || lower.contains("warning:") || lower.contains("style") {
        IssueKind::Lint
    } else {
        IssueKind::Other
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    fn ok() -> Self {
        Self { valid: true, issues: Vec::new() }
    }

    fn summary(&self) -> String {
        self.issues.iter().map(|i| i.message.as_str()).collect::<Vec<_>>().join("\n")
    }
}

/// The shell commands used to validate generated source, and the budgets
/// governing the loop around them.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub lint_command: Option<String>,
    pub type_check_command: Option<String>,
    pub test_command: Option<String>,
    pub command_timeout: Duration,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            lint_command: None,
            type_check_command: None,
            test_command: None,
            command_timeout: Duration::from_secs(120),
        }
    }
}

/// Delimiter-balance check standing in for a real parse: cheap, language
/// agnostic, and enough to catch the truncated/garbled output an LLM
/// occasionally returns.
fn has_balanced_delimiters(source: &str) -> bool {
    let mut stack = Vec::new();
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    for ch in source.chars() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == quote {
                in_string = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => in_string = Some(ch),
            '(' | '[' | '{' => stack.push(ch),
            ')' => {
                if stack.pop() != Some('(') {
                    return false;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return false;
                }
            }
            '}' => {
                if stack.pop() != Some('{') {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty() && in_string.is_none()
}

async fn run_validator(shell: &dyn ShellRunner, command: &str, timeout: Duration, kind: IssueKind) -> Option<ValidationIssue> {
    match shell.run_command(command, Some(timeout)).await {
        Ok(output) if output.exit_code == Some(0) => None,
        Ok(output) => Some(ValidationIssue {
            kind,
            message: if output.output.trim().is_empty() {
                format!("{} exited with status {:?}", command, output.exit_code)
            } else {
                output.output
            },
        }),
        Err(err) => {
            warn!(command, error = %err, "validator command failed to run");
            Some(ValidationIssue {
                kind: IssueKind::Other,
                message: format!("failed to run `{command}`: {err}"),
            })
        }
    }
}

/// Syntax check plus configured lint/type-check commands, spec §4.10 step 2.
pub async fn validate_source(source: &str, shell: &dyn ShellRunner, config: &ValidationConfig) -> ValidationOutcome {
    let mut issues = Vec::new();

    if !has_balanced_delimiters(source) {
        issues.push(ValidationIssue {
            kind: IssueKind::Syntax,
            message: "unbalanced delimiters in generated source".to_string(),
        });
    }

    if let Some(command) = &config.lint_command {
        if let Some(issue) = run_validator(shell, command, config.command_timeout, IssueKind::Lint).await {
            issues.push(issue);
        }
    }
    if let Some(command) = &config.type_check_command {
        if let Some(issue) = run_validator(shell, command, config.command_timeout, IssueKind::Type).await {
            issues.push(issue);
        }
    }

    if issues.is_empty() {
        ValidationOutcome::ok()
    } else {
        ValidationOutcome { valid: false, issues }
    }
}

fn render_plan_for_file(file_path: &str, details: &[ImplementationDetail]) -> String {
    let mut prompt = format!("Generate the complete contents of `{file_path}`.\n\nRequired functions/types:\n");
    for detail in details {
        prompt.push_str(&format!("- {}", detail.function_name));
        if let Some(sig) = &detail.signature {
            prompt.push_str(&format!(" {sig}"));
        }
        prompt.push_str(&format!(": {}\n", detail.description));
        if !detail.imports.is_empty() {
            prompt.push_str(&format!("  imports: {}\n", detail.imports.join(", ")));
        }
    }
    prompt
}

/// Drives the full validation loop for every file in `plan`, per spec
/// §4.10: generate, validate, refine in-loop up to
/// `config.max_generator_attempts`, delegate to the orchestrator on
/// exhaustion, then run the project test suite and apply a
/// syntax-gated refinement if it fails.
#[allow(clippy::too_many_arguments)]
pub async fn generate_code(
    plan: &ImplementationPlan,
    task: &str,
    tech_stack: &str,
    fs: &dyn FileSystem,
    llm: &dyn LlmClient,
    shell: &dyn ShellRunner,
    planner: &dyn Planner,
    code_generator: &dyn CodeGenerator,
    orchestrator: &mut Orchestrator,
    config: &DebugConfig,
    validation: &ValidationConfig,
) -> BTreeMap<String, String> {
    let mut output = BTreeMap::new();

    for (file_path, details) in plan {
        let task_for_file = format!("{task}\n\n{}", render_plan_for_file(file_path, details));
        let plan_text = orchestrator.current_plan().unwrap_or("").to_string();

        let mut generated = code_generator
            .generate_code(&task_for_file, &plan_text, tech_stack, None)
            .await
            .files
            .remove(file_path)
            .unwrap_or_default();

        let mut validated = false;
        for attempt in 1..=config.max_generator_attempts {
            let outcome = validate_source(&generated, shell, validation).await;
            if outcome.valid {
                info!(file = file_path.as_str(), attempt, "generated file passed validation");
                validated = true;
                break;
            }

            warn!(file = file_path.as_str(), attempt, issues = outcome.issues.len(), "validation failed, refining");
            if attempt == config.max_generator_attempts {
                break;
            }

            let refinement_task = format!(
                "{task_for_file}\n\nThe previous attempt failed validation with these issues:\n{}\n\nProduce a corrected version of the complete file.",
                outcome.summary()
            );
            generated = code_generator
                .generate_code(&refinement_task, &plan_text, tech_stack, None)
                .await
                .files
                .remove(file_path)
                .unwrap_or(generated);
        }

        if !validated {
            let final_check = validate_source(&generated, shell, validation).await;
            if !final_check.valid {
                let _ = fs.write_file(std::path::Path::new(file_path), &generated).await;
                for issue in &final_check.issues {
                    let fix_outcome = orchestrator
                        .debug_generation_issue(fs, llm, planner, code_generator, None, file_path, &issue.message, issue.kind.label())
                        .await;
                    if fix_outcome.success {
                        if let Some(fixed) = fix_outcome.changes.get(file_path) {
                            generated = fixed.clone();
                        }
                    }
                }
            }
        }

        output.insert(file_path.clone(), generated);
    }

    if let Some(test_command) = &validation.test_command {
        run_test_suite_refinement(&mut output, test_command, fs, shell, code_generator, task, tech_stack, orchestrator, validation).await;
    }

    output
}

#[allow(clippy::too_many_arguments)]
async fn run_test_suite_refinement(
    output: &mut BTreeMap<String, String>,
    test_command: &str,
    fs: &dyn FileSystem,
    shell: &dyn ShellRunner,
    code_generator: &dyn CodeGenerator,
    task: &str,
    tech_stack: &str,
    orchestrator: &Orchestrator,
    validation: &ValidationConfig,
) {
    for (file_path, content) in output.iter_mut() {
        let _ = fs.write_file(std::path::Path::new(file_path), content).await;
    }

    let test_result = shell.run_command(test_command, Some(validation.command_timeout)).await;
    let passed = matches!(&test_result, Ok(o) if o.exit_code == Some(0));
    if passed {
        return;
    }

    let failure_output = test_result.map(|o| o.output).unwrap_or_else(|e| e.to_string());
    warn!(output_len = failure_output.len(), "project test suite failed, attempting test-oriented refinement");

    let plan_text = orchestrator.current_plan().unwrap_or("").to_string();
    for (file_path, content) in output.iter_mut() {
        let refinement_task = format!(
            "{task}\n\nThe project test suite failed with this output:\n{failure_output}\n\nRevise `{file_path}` (current contents below) to fix the failure, preserving unrelated behavior.\n\n```\n{content}\n```"
        );
        let candidate = code_generator
            .generate_code(&refinement_task, &plan_text, tech_stack, None)
            .await
            .files
            .remove(file_path);

        if let Some(candidate) = candidate {
            if has_balanced_delimiters(&candidate) {
                *content = candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern_store::PatternStore;
    use crate::ports::test_doubles::{InMemoryFileSystem, ScriptedLlmClient};
    use std::collections::BTreeMap as Map;

    struct ScriptedShell {
        results: std::sync::Mutex<Vec<std::io::Result<crate::ports::ShellOutput>>>,
    }

    impl ScriptedShell {
        fn new(results: Vec<std::io::Result<crate::ports::ShellOutput>>) -> Self {
            Self { results: std::sync::Mutex::new(results) }
        }
    }

    #[async_trait::async_trait]
    impl ShellRunner for ScriptedShell {
        async fn run_command(&self, _command: &str, _timeout: Option<Duration>) -> std::io::Result<crate::ports::ShellOutput> {
            self.results.lock().unwrap().remove(0)
        }
    }

    fn ok_output() -> crate::ports::ShellOutput {
        crate::ports::ShellOutput { exit_code: Some(0), output: String::new() }
    }

    fn fail_output(msg: &str) -> crate::ports::ShellOutput {
        crate::ports::ShellOutput { exit_code: Some(1), output: msg.to_string() }
    }

    struct ScriptedGenerator {
        responses: std::sync::Mutex<Vec<BTreeMap<String, String>>>,
    }

    #[async_trait::async_trait]
    impl CodeGenerator for ScriptedGenerator {
        async fn generate_code(&self, _task: &str, _plan: &str, _tech_stack: &str, _max_token_count: Option<u32>) -> crate::ports::CodeGenResult {
            let files = self.responses.lock().unwrap().remove(0);
            crate::ports::CodeGenResult { success: true, files }
        }
    }

    struct NoopPlanner;
    #[async_trait::async_trait]
    impl Planner for NoopPlanner {
        async fn generate_plan(&self, _task: &str, _context: Option<&Map<String, String>>) -> crate::ports::PlanResult {
            crate::ports::PlanResult { success: true, plan: "plan".to_string() }
        }
    }

    fn orchestrator() -> (Orchestrator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = PatternStore::load(dir.path().join("patterns.json"));
        (Orchestrator::new(store, DebugConfig::default(), "task", "python"), dir)
    }

    fn plan() -> ImplementationPlan {
        let mut plan = ImplementationPlan::new();
        plan.insert(
            "gen.py".to_string(),
            vec![ImplementationDetail {
                function_name: "add".to_string(),
                signature: Some("(a, b)".to_string()),
                description: "returns a + b".to_string(),
                imports: Vec::new(),
            }],
        );
        plan
    }

    #[test]
    fn balanced_delimiters_accepts_well_formed_source() {
        assert!(has_balanced_delimiters("def add(a, b):\n    return a + b\n"));
        assert!(!has_balanced_delimiters("def add(a, b:\n    return a + b\n"));
    }

    #[test]
    fn classify_issue_picks_most_specific_bucket() {
        assert_eq!(classify_issue("NameError: 'x' is not defined"), IssueKind::Undefined);
        assert_eq!(classify_issue("SyntaxError: unexpected token"), IssueKind::Syntax);
        assert_eq!(classify_issue("ModuleNotFoundError: no module named 'foo'"), IssueKind::Import);
    }

    #[tokio::test]
    async fn valid_on_first_try_needs_no_refinement() {
        let (mut orchestrator, _dir) = orchestrator();
        let fs = InMemoryFileSystem::default();
        let llm = ScriptedLlmClient::new(vec![]);
        let shell = ScriptedShell::new(vec![Ok(ok_output())]);
        let planner = NoopPlanner;
        let generator = ScriptedGenerator {
            responses: std::sync::Mutex::new(vec![BTreeMap::from([(
                "gen.py".to_string(),
                "def add(a, b):\n    return a + b\n".to_string(),
            )])]),
        };
        let validation = ValidationConfig::default();

        let result = generate_code(
            &plan(),
            "build an adder",
            "python",
            &fs,
            &llm,
            &shell,
            &planner,
            &generator,
            &mut orchestrator,
            &DebugConfig::default(),
            &validation,
        )
        .await;

        assert_eq!(result.get("gen.py").unwrap(), "def add(a, b):\n    return a + b\n");
    }

    #[tokio::test]
    async fn refines_until_valid_within_budget() {
        let (mut orchestrator, _dir) = orchestrator();
        let fs = InMemoryFileSystem::default();
        let llm = ScriptedLlmClient::new(vec![]);
        let shell = ScriptedShell::new(vec![]);
        let planner = NoopPlanner;
        let generator = ScriptedGenerator {
            responses: std::sync::Mutex::new(vec![
                BTreeMap::from([("gen.py".to_string(), "def add(a, b:\n    return a + b\n".to_string())]),
                BTreeMap::from([("gen.py".to_string(), "def add(a, b):\n    return a + b\n".to_string())]),
            ]),
        };
        let validation = ValidationConfig::default();

        let result = generate_code(
            &plan(),
            "build an adder",
            "python",
            &fs,
            &llm,
            &shell,
            &planner,
            &generator,
            &mut orchestrator,
            &DebugConfig::default(),
            &validation,
        )
        .await;

        assert_eq!(result.get("gen.py").unwrap(), "def add(a, b):\n    return a + b\n");
    }

    #[tokio::test]
    async fn exhausts_in_loop_budget_then_delegates_to_orchestrator() {
        let (mut orchestrator, _dir) = orchestrator();
        let fs = InMemoryFileSystem::default();
        let llm = ScriptedLlmClient::new(vec![Ok(
            "```filepath:gen.py\ndef add(a, b):\n    return a + b\n```\n".to_string(),
        )]);
        let shell = ScriptedShell::new(vec![]);
        let planner = NoopPlanner;
        let mut config = DebugConfig::default();
        config.max_generator_attempts = 2;
        let generator = ScriptedGenerator {
            responses: std::sync::Mutex::new(vec![
                BTreeMap::from([("gen.py".to_string(), "def add(a, b:\n    return a + b\n".to_string())]),
                BTreeMap::from([("gen.py".to_string(), "def add(a, b:\n    still broken\n".to_string())]),
            ]),
        };
        let validation = ValidationConfig::default();

        let result = generate_code(
            &plan(),
            "build an adder",
            "python",
            &fs,
            &llm,
            &shell,
            &planner,
            &generator,
            &mut orchestrator,
            &config,
            &validation,
        )
        .await;

        assert_eq!(result.get("gen.py").unwrap(), "def add(a, b):\n    return a + b\n");
        assert_eq!(orchestrator.get_error_history().len(), 1);
        assert!(orchestrator.get_error_history()[0].success);
    }

    #[tokio::test]
    async fn test_suite_failure_triggers_gated_refinement() {
        let (mut orchestrator, _dir) = orchestrator();
        let fs = InMemoryFileSystem::default();
        let llm = ScriptedLlmClient::new(vec![]);
        let shell = ScriptedShell::new(vec![Ok(fail_output("1 failed"))]);
        let planner = NoopPlanner;
        let generator = ScriptedGenerator {
            responses: std::sync::Mutex::new(vec![
                BTreeMap::from([("gen.py".to_string(), "def add(a, b):\n    return a + b\n".to_string())]),
                BTreeMap::from([("gen.py".to_string(), "def add(a, b):\n    return a + b + 1\n".to_string())]),
            ]),
        };
        let mut validation = ValidationConfig::default();
        validation.test_command = Some("pytest".to_string());

        let result = generate_code(
            &plan(),
            "build an adder",
            "python",
            &fs,
            &llm,
            &shell,
            &planner,
            &generator,
            &mut orchestrator,
            &DebugConfig::default(),
            &validation,
        )
        .await;

        assert_eq!(result.get("gen.py").unwrap(), "def add(a, b):\n    return a + b + 1\n");
    }
}
