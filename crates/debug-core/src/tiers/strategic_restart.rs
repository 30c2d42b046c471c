//! Tier 3: escalating restart strategies once quick fixes and full debug
//! passes have failed to resolve an error category — regenerate the code
//! under the existing plan, redesign the plan, or rewrite the task itself.

use std::time::Instant;

use debug_types::{DebugAttempt, DebugConfig, ErrorCategory, ErrorContext, LogLevel, RestartStrategy, Section};

use crate::llm::{cached_call_llm, LlmOutcome, PrefixCache, SemanticCache};
use crate::parsers::extract_json_from_response;
use crate::ports::{CodeGenerator, FileSystem, LlmClient, Planner};
use crate::scratchpad::Scratchpad;

use super::{prompt_data, TierOutcome};

const MODIFY_REQUEST_TEMPERATURE: f64 = 0.4;

/// Mutable episode state a strategic restart may read and, on success,
/// rewrite: the task description and plan text the code generator and
/// planner operate on.
pub struct RestartContext<'a> {
    pub current_task: &'a mut String,
    pub current_plan: &'a mut Option<String>,
    pub tech_stack: &'a str,
}

/// Escalation logic from spec §4.8: default to regenerating code, escalate
/// to plan redesign then request modification once a prior attempt at the
/// current rung exists for this error category, with category overrides
/// nudging implementation-looking errors away from `ModifyRequest` and
/// environment-looking errors away from `RegenerateCode`.
pub fn determine_restart_strategy(category: ErrorCategory, debug_history: &[DebugAttempt]) -> (RestartStrategy, String) {
    let same_category_attempts: Vec<&DebugAttempt> = debug_history
        .iter()
        .filter(|attempt| attempt.error_context.category == category)
        .collect();

    let restart_strategy_of = |attempt: &DebugAttempt| -> Option<RestartStrategy> {
        attempt
            .metadata
            .get("restart_strategy")
            .and_then(|v| v.as_str())
            .and_then(RestartStrategy::parse)
    };

    let mut strategy = RestartStrategy::RegenerateCode;
    let mut reasoning = "Initial restart strategy is to regenerate code while keeping the plan.".to_string();

    if same_category_attempts
        .iter()
        .any(|a| restart_strategy_of(a) == Some(RestartStrategy::RegenerateCode))
    {
        strategy = RestartStrategy::RedesignPlan;
        reasoning = "Previous code regeneration attempts failed to resolve similar errors.".to_string();
    }

    if same_category_attempts
        .iter()
        .any(|a| restart_strategy_of(a) == Some(RestartStrategy::RedesignPlan))
    {
        strategy = RestartStrategy::ModifyRequest;
        reasoning = "Both code regeneration and plan redesign failed to resolve similar errors.".to_string();
    }

    let implementation_category = matches!(
        category,
        ErrorCategory::Syntax | ErrorCategory::Type | ErrorCategory::Name | ErrorCategory::Attribute
    );
    let environmental_category = matches!(
        category,
        ErrorCategory::Permission | ErrorCategory::Network | ErrorCategory::Database | ErrorCategory::Memory
    );

    if implementation_category && strategy == RestartStrategy::ModifyRequest {
        strategy = RestartStrategy::RedesignPlan;
        reasoning
            .push_str(" However, the error type suggests an implementation issue rather than a fundamental request problem.");
    } else if environmental_category && strategy == RestartStrategy::RegenerateCode {
        strategy = RestartStrategy::RedesignPlan;
        reasoning.push_str(" The error type suggests a potential architectural or environmental issue that may require plan changes.");
    }

    (strategy, reasoning)
}

#[allow(clippy::too_many_arguments)]
pub async fn execute_strategic_restart(
    error_context: &ErrorContext,
    debug_history: &[DebugAttempt],
    fs: &dyn FileSystem,
    llm: &dyn LlmClient,
    planner: &dyn Planner,
    code_generator: &dyn CodeGenerator,
    config: &DebugConfig,
    semantic_cache: &SemanticCache,
    prefix_cache: &PrefixCache,
    mut scratchpad: Option<&mut Scratchpad>,
    restart_ctx: &mut RestartContext<'_>,
) -> TierOutcome {
    if let Some(pad) = scratchpad.as_deref_mut() {
        pad.log(
            "DebuggingManager",
            "Executing strategic restart",
            LogLevel::Warning,
            Some(Section::Debugging),
            Default::default(),
            Default::default(),
        );
    }

    let (strategy, reasoning) = determine_restart_strategy(error_context.category, debug_history);

    if let Some(pad) = scratchpad.as_deref_mut() {
        pad.start_section(Section::Decision);
        pad.log(
            "DebuggingManager",
            &format!("Selected restart strategy: {strategy}\nReasoning: {reasoning}"),
            LogLevel::Info,
            Some(Section::Decision),
            Default::default(),
            Default::default(),
        );
        pad.end_section(Some(Section::Decision));
    }

    match strategy {
        RestartStrategy::RegenerateCode => execute_code_regeneration(error_context, fs, code_generator, restart_ctx).await,
        RestartStrategy::RedesignPlan => execute_plan_redesign(error_context, fs, planner, code_generator, restart_ctx).await,
        RestartStrategy::ModifyRequest => {
            execute_request_modification(
                error_context,
                debug_history,
                fs,
                llm,
                planner,
                code_generator,
                config,
                semantic_cache,
                prefix_cache,
                scratchpad,
                restart_ctx,
            )
            .await
        }
    }
}

fn error_summary(error_context: &ErrorContext) -> String {
    format!("Error ({}): {}", error_context.category.as_str(), error_context.message)
}

async fn write_generated_files(fs: &dyn FileSystem, files: &std::collections::BTreeMap<String, String>) {
    for (path, content) in files {
        let _ = fs.write_file(std::path::Path::new(path), content).await;
    }
}

fn with_restart_metadata(mut outcome: TierOutcome, strategy: RestartStrategy, modified_files: &std::collections::BTreeMap<String, String>) -> TierOutcome {
    outcome.metadata.insert("tier".to_string(), serde_json::Value::String("strategic_restart".to_string()));
    outcome
        .metadata
        .insert("restart_strategy".to_string(), serde_json::Value::String(strategy.as_str().to_string()));
    outcome.metadata.insert(
        "modified_files".to_string(),
        serde_json::Value::Array(modified_files.keys().cloned().map(serde_json::Value::String).collect()),
    );
    outcome
}

async fn execute_code_regeneration(
    error_context: &ErrorContext,
    fs: &dyn FileSystem,
    code_generator: &dyn CodeGenerator,
    restart_ctx: &mut RestartContext<'_>,
) -> TierOutcome {
    let start = Instant::now();

    let Some(plan) = restart_ctx.current_plan.clone() else {
        return TierOutcome::failure(
            "Cannot regenerate code: no current plan available",
            "Code regeneration requires access to the current plan.",
        );
    };

    let mut plan_with_error = format!("{plan}\n\nPrevious implementation error:\n{}\n", error_summary(error_context));
    if !error_context.traceback.is_empty() {
        plan_with_error.push_str(&format!("Traceback:\n{}\n", error_context.traceback));
    }

    let result = code_generator
        .generate_code(restart_ctx.current_task, &plan_with_error, restart_ctx.tech_stack, None)
        .await;

    if !result.success {
        return TierOutcome::failure("Code regeneration failed", "Failed to generate new code implementation.");
    }

    write_generated_files(fs, &result.files).await;

    with_restart_metadata(
        TierOutcome {
            success: true,
            description: format!("Regenerated code for {} files", result.files.len()),
            reasoning: "Complete code regeneration based on the existing plan.".to_string(),
            changes: result.files.clone(),
            duration_seconds: start.elapsed().as_secs_f64(),
            metadata: Default::default(),
        },
        RestartStrategy::RegenerateCode,
        &result.files,
    )
}

async fn execute_plan_redesign(
    error_context: &ErrorContext,
    fs: &dyn FileSystem,
    planner: &dyn Planner,
    code_generator: &dyn CodeGenerator,
    restart_ctx: &mut RestartContext<'_>,
) -> TierOutcome {
    let start = Instant::now();

    if restart_ctx.current_task.is_empty() {
        return TierOutcome::failure(
            "Cannot redesign plan: no current task available",
            "Plan redesign requires access to the current task.",
        );
    }

    let mut context = std::collections::BTreeMap::new();
    context.insert("error_context".to_string(), error_summary(error_context));

    let plan_result = planner.generate_plan(restart_ctx.current_task, Some(&context)).await;
    if !plan_result.success || plan_result.plan.is_empty() {
        return TierOutcome::failure("Plan redesign failed", "Failed to generate a new plan.");
    }

    *restart_ctx.current_plan = Some(plan_result.plan.clone());

    let code_result = code_generator
        .generate_code(restart_ctx.current_task, &plan_result.plan, restart_ctx.tech_stack, None)
        .await;
    if !code_result.success {
        return TierOutcome::failure(
            "Code generation after plan redesign failed",
            "Failed to generate code based on new plan.",
        );
    }

    write_generated_files(fs, &code_result.files).await;

    let mut outcome = with_restart_metadata(
        TierOutcome {
            success: true,
            description: format!("Redesigned plan and generated {} files", code_result.files.len()),
            reasoning: "Complete plan redesign and code regeneration.".to_string(),
            changes: code_result.files.clone(),
            duration_seconds: start.elapsed().as_secs_f64(),
            metadata: Default::default(),
        },
        RestartStrategy::RedesignPlan,
        &code_result.files,
    );
    outcome
        .metadata
        .insert("new_plan".to_string(), serde_json::Value::String(plan_result.plan));
    outcome
}

#[allow(clippy::too_many_arguments)]
async fn execute_request_modification(
    error_context: &ErrorContext,
    debug_history: &[DebugAttempt],
    fs: &dyn FileSystem,
    llm: &dyn LlmClient,
    planner: &dyn Planner,
    code_generator: &dyn CodeGenerator,
    config: &DebugConfig,
    semantic_cache: &SemanticCache,
    prefix_cache: &PrefixCache,
    mut scratchpad: Option<&mut Scratchpad>,
    restart_ctx: &mut RestartContext<'_>,
) -> TierOutcome {
    let start = Instant::now();

    if restart_ctx.current_task.is_empty() {
        return TierOutcome::failure(
            "Cannot modify request: no current task available",
            "Request modification requires access to the current task.",
        );
    }

    let mut summary = format!(
        "Error Category: {}\nError Message: {}\nFile: {}\nLine: {}\n",
        error_context.category.as_str(),
        error_context.message,
        error_context.file_path.as_deref().unwrap_or("<none>"),
        error_context.line_number.map(|n| n.to_string()).unwrap_or_else(|| "<none>".to_string()),
    );
    if let Some(snippet) = &error_context.code_snippet {
        summary.push_str(&format!("\nCode Snippet:\n{snippet}\n"));
    }
    if !error_context.traceback.is_empty() {
        summary.push_str(&format!("\nTraceback:\n{}\n", error_context.traceback));
    }

    let mut history_block = String::from("Debug Attempt History:\n");
    for (i, attempt) in debug_history.iter().rev().take(5).rev().enumerate() {
        history_block.push_str(&format!(
            "{}. {} - {}\n   Result: {}\n",
            i + 1,
            attempt.phase.as_str(),
            attempt.fix_description,
            if attempt.success { "SUCCESS" } else { "FAILED" }
        ));
    }

    let prompt = format!(
        "You are an expert AI assistant tasked with modifying a task request that has repeatedly failed to implement.\n\n\
         Original Task Request:\n{task}\n\nError Information:\n{summary}\n\n{history_block}\n\
         Multiple debugging attempts and strategic restarts have failed to resolve this issue.\n\n\
         Based on the error patterns and debugging history, create a modified version of the original task\n\
         that avoids the problems encountered. Consider simplifying requirements, suggesting alternative\n\
         approaches, breaking the task into smaller pieces, addressing environmental constraints, and\n\
         clarifying ambiguities.\n\n\
         Return a JSON object: {{\"modified_task\": \"...\", \"rationale\": \"...\", \"implementation_steps\": [\"...\"]}}",
        task = restart_ctx.current_task,
    );

    if let Some(pad) = scratchpad.as_deref_mut() {
        pad.start_section(Section::Reasoning);
    }

    let outcome = cached_call_llm(
        &prompt,
        llm,
        "generate",
        &prompt_data(prompt.clone(), MODIFY_REQUEST_TEMPERATURE),
        config,
        semantic_cache,
        prefix_cache,
        scratchpad.as_deref_mut(),
        &error_context.summary(),
    )
    .await;

    let response = match outcome {
        LlmOutcome::Success { response, .. } => response,
        LlmOutcome::Failure { error, .. } => {
            if let Some(pad) = scratchpad.as_deref_mut() {
                pad.end_section(Some(Section::Reasoning));
            }
            return TierOutcome::failure(
                format!("Request modification failed: {error}"),
                "LLM call failed during request modification.",
            );
        }
    };

    if let Some(pad) = scratchpad.as_deref_mut() {
        pad.end_section(Some(Section::Reasoning));
    }

    let Some(modification) = extract_json_from_response(&response) else {
        return TierOutcome::failure("Request modification failed: could not extract JSON", response);
    };

    let modified_task = modification.get("modified_task").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let rationale = modification.get("rationale").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let steps: Vec<String> = modification
        .get("implementation_steps")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    if modified_task.is_empty() {
        return TierOutcome::failure("Request modification failed: no modified task", rationale);
    }

    let original_task = restart_ctx.current_task.clone();
    let original_plan = restart_ctx.current_plan.clone();
    *restart_ctx.current_task = modified_task.clone();

    let plan_result = planner.generate_plan(&modified_task, None).await;

    if !plan_result.success || plan_result.plan.is_empty() {
        *restart_ctx.current_task = original_task;
        *restart_ctx.current_plan = original_plan;
        return TierOutcome::failure(
            "Modified request planning failed",
            format!("Failed to generate a plan for the modified task. Rationale: {rationale}"),
        );
    }

    *restart_ctx.current_plan = Some(plan_result.plan.clone());

    let code_result = code_generator
        .generate_code(&modified_task, &plan_result.plan, restart_ctx.tech_stack, None)
        .await;
    if !code_result.success {
        *restart_ctx.current_task = original_task;
        *restart_ctx.current_plan = original_plan;
        return TierOutcome::failure(
            "Code generation for modified request failed",
            format!("Failed to generate code for the modified task. Rationale: {rationale}"),
        );
    }

    write_generated_files(fs, &code_result.files).await;

    let mut outcome = with_restart_metadata(
        TierOutcome {
            success: true,
            description: format!("Modified task request and generated {} files", code_result.files.len()),
            reasoning: rationale,
            changes: code_result.files.clone(),
            duration_seconds: start.elapsed().as_secs_f64(),
            metadata: Default::default(),
        },
        RestartStrategy::ModifyRequest,
        &code_result.files,
    );
    outcome
        .metadata
        .insert("modified_task".to_string(), serde_json::Value::String(modified_task));
    outcome
        .metadata
        .insert("new_plan".to_string(), serde_json::Value::String(plan_result.plan));
    outcome.metadata.insert(
        "implementation_steps".to_string(),
        serde_json::Value::Array(steps.into_iter().map(serde_json::Value::String).collect()),
    );
    outcome
}
