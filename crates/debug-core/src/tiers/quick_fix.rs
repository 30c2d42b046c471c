//! Tier 1: a single-file repair using minimal context. Reads the broken
//! file, asks the LLM for a fix with a low sampling temperature, extracts
//! one code block, and overwrites the file.

use std::path::Path;
use std::time::Instant;

use debug_types::{DebugConfig, ErrorContext, LogLevel, Section};

use crate::llm::{cached_call_llm, PrefixCache, SemanticCache};
use crate::parsers::{extract_code_from_response, extract_reasoning_from_response};
use crate::ports::{FileSystem, LlmClient};
use crate::scratchpad::Scratchpad;

use super::{prompt_data, test_failure_block, TierOutcome};

const QUICK_FIX_TEMPERATURE: f64 = 0.2;

fn build_prompt(error_context: &ErrorContext, file_content: &str) -> String {
    let line = error_context
        .line_number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "You are fixing a {category} error in a source file.\n\n\
         File: {file}\nLine: {line}\nError: {message}\n\n\
         Full file content:\n```\n{content}\n```\n{test_block}\n\
         Return the corrected file content in a single fenced code block.",
        category = error_context.category.as_str(),
        file = error_context.file_path.as_deref().unwrap_or("<unknown>"),
        message = error_context.message,
        content = file_content,
        test_block = test_failure_block(error_context),
    )
}

#[allow(clippy::too_many_arguments)]
pub async fn execute_quick_fix(
    error_context: &ErrorContext,
    fs: &dyn FileSystem,
    llm: &dyn LlmClient,
    config: &DebugConfig,
    semantic_cache: &SemanticCache,
    prefix_cache: &PrefixCache,
    mut scratchpad: Option<&mut Scratchpad>,
    attempt: u32,
) -> TierOutcome {
    let start = Instant::now();

    if let Some(pad) = scratchpad.as_deref_mut() {
        pad.log(
            "DebuggingManager",
            "Executing generator quick fix",
            LogLevel::Info,
            Some(Section::Debugging),
            Default::default(),
            Default::default(),
        );
    }

    let Some(file_path) = &error_context.file_path else {
        return TierOutcome::failure(
            "Cannot execute quick fix: missing or invalid file path",
            "Generator quick fix requires a valid file path to modify.",
        );
    };
    let path = Path::new(file_path);
    if !fs.exists(path).await {
        return TierOutcome::failure(
            "Cannot execute quick fix: missing or invalid file path",
            "Generator quick fix requires a valid file path to modify.",
        );
    }

    let file_content = match fs.read_file(path).await {
        Ok(content) if !content.is_empty() => content,
        Ok(_) => {
            return TierOutcome::failure(
                "Cannot execute quick fix: unable to read file",
                "Failed to read file contents for quick fix.",
            )
        }
        Err(err) => {
            return TierOutcome::failure(
                format!("Cannot execute quick fix: error reading file: {err}"),
                "Failed to read file contents for quick fix.",
            )
        }
    };

    let prompt = build_prompt(error_context, &file_content);

    if let Some(pad) = scratchpad.as_deref_mut() {
        pad.start_section(Section::Reasoning);
        pad.log(
            "DebuggingManager",
            "Generator Quick Fix Reasoning",
            LogLevel::Info,
            Some(Section::Reasoning),
            Default::default(),
            Default::default(),
        );
    }

    let outcome = cached_call_llm(
        &prompt,
        llm,
        "generate",
        &prompt_data(prompt.clone(), QUICK_FIX_TEMPERATURE),
        config,
        semantic_cache,
        prefix_cache,
        scratchpad.as_deref_mut(),
        &error_context.summary(),
    )
    .await;

    let response = match outcome {
        crate::llm::LlmOutcome::Success { response, .. } => response,
        crate::llm::LlmOutcome::Failure { error, .. } => {
            if let Some(pad) = scratchpad.as_deref_mut() {
                pad.log(
                    "DebuggingManager",
                    &format!("Generator quick fix failed: {error}"),
                    LogLevel::Error,
                    Some(Section::Reasoning),
                    Default::default(),
                    Default::default(),
                );
                pad.end_section(Some(Section::Reasoning));
            }
            return TierOutcome::failure(format!("Quick fix failed: {error}"), "LLM call failed during quick fix attempt.");
        }
    };

    if let Some(pad) = scratchpad.as_deref_mut() {
        pad.log(
            "DebuggingManager",
            &format!("Generator reasoning:\n{response}"),
            LogLevel::Info,
            Some(Section::Reasoning),
            Default::default(),
            Default::default(),
        );
    }

    let Some(fixed_code) = extract_code_from_response(&response) else {
        if let Some(pad) = scratchpad.as_deref_mut() {
            pad.log(
                "DebuggingManager",
                "Could not extract fixed code from response",
                LogLevel::Warning,
                Some(Section::Reasoning),
                Default::default(),
                Default::default(),
            );
            pad.end_section(Some(Section::Reasoning));
        }
        return TierOutcome::failure("Quick fix failed: could not extract fixed code", response);
    };

    let reasoning = extract_reasoning_from_response(&response);

    if let Some(pad) = scratchpad.as_deref_mut() {
        pad.end_section(Some(Section::Reasoning));
    }

    match fs.write_file(path, &fixed_code).await {
        Ok(()) => {
            let mut changes = std::collections::BTreeMap::new();
            changes.insert(file_path.clone(), fixed_code);

            let mut metadata = std::collections::BTreeMap::new();
            metadata.insert("tier".to_string(), serde_json::Value::String("generator_quick_fix".to_string()));
            metadata.insert("attempt".to_string(), serde_json::Value::from(attempt));

            TierOutcome {
                success: true,
                description: format!(
                    "Applied quick fix to {}",
                    Path::new(file_path).file_name().and_then(|n| n.to_str()).unwrap_or(file_path)
                ),
                reasoning,
                changes,
                duration_seconds: start.elapsed().as_secs_f64(),
                metadata,
            }
        }
        Err(err) => {
            if let Some(pad) = scratchpad.as_deref_mut() {
                pad.log(
                    "DebuggingManager",
                    &format!("Error applying quick fix: {err}"),
                    LogLevel::Error,
                    None,
                    Default::default(),
                    Default::default(),
                );
            }
            let mut changes = std::collections::BTreeMap::new();
            changes.insert(file_path.clone(), fixed_code);
            TierOutcome {
                success: false,
                description: format!("Error applying quick fix: {err}"),
                reasoning,
                changes,
                ..Default::default()
            }
        }
    }
}
