//! Tier 2: a multi-file repair enriched with related-file context and
//! previously recorded Chain-of-Thought reasoning about similar errors.

use std::path::Path;
use std::time::Instant;

use debug_types::{DebugConfig, ErrorContext, LogLevel, Section};

use crate::context_helpers::get_related_files;
use crate::llm::{cached_call_llm, PrefixCache, SemanticCache};
use crate::parsers::{extract_multi_file_fixes, extract_reasoning_from_response};
use crate::ports::{is_safe_new_file, FileSystem, LlmClient};
use crate::scratchpad::Scratchpad;

use super::{prompt_data, test_failure_block, TierOutcome};

const FULL_DEBUG_TEMPERATURE: f64 = 0.3;
const MAX_COT_ENTRIES: usize = 5;

fn build_prompt(
    error_context: &ErrorContext,
    file_content: &str,
    related_files: &std::collections::BTreeMap<String, String>,
    cot_context: &[crate::scratchpad::SectionEntry],
) -> String {
    let line = error_context
        .line_number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let mut prompt = format!(
        "You are debugging a {category} error across multiple files.\n\n\
         File: {file}\nLine: {line}\nError: {message}\n\n\
         Full file content:\n```\n{content}\n```\n",
        category = error_context.category.as_str(),
        file = error_context.file_path.as_deref().unwrap_or("<unknown>"),
        message = error_context.message,
        content = file_content,
    );

    if !related_files.is_empty() {
        prompt.push_str("\nRelated files:\n");
        for (path, content) in related_files {
            prompt.push_str(&format!("```filepath:{path}\n{content}\n```\n"));
        }
    }

    if !cot_context.is_empty() {
        prompt.push_str("\nPrevious debugging insights:\n");
        for entry in cot_context {
            prompt.push_str(&format!(
                "- (relevance {:.2}) {}\n",
                entry.relevance_score.unwrap_or(0.0),
                entry.content
            ));
        }
    }

    prompt.push_str(&test_failure_block(error_context));
    prompt.push_str(
        "\nReturn fixes for every file that needs a change, each in its own \
         ```filepath:<path>\\n<content>\\n``` block.",
    );
    prompt
}

#[allow(clippy::too_many_arguments)]
pub async fn execute_full_debug(
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
            "Executing full debugging with CoT",
            LogLevel::Info,
            Some(Section::Debugging),
            Default::default(),
            Default::default(),
        );
    }

    let Some(file_path) = &error_context.file_path else {
        return TierOutcome::failure(
            "Cannot execute debugging: missing or invalid file path",
            "Full debugging requires a valid file path to modify.",
        );
    };
    let path = Path::new(file_path);
    if !fs.exists(path).await {
        return TierOutcome::failure(
            "Cannot execute debugging: missing or invalid file path",
            "Full debugging requires a valid file path to modify.",
        );
    }

    let file_content = match fs.read_file(path).await {
        Ok(content) if !content.is_empty() => content,
        Ok(_) => {
            return TierOutcome::failure(
                "Cannot execute debugging: unable to read file",
                "Failed to read file contents for debugging.",
            )
        }
        Err(err) => {
            return TierOutcome::failure(
                format!("Cannot execute debugging: error reading file: {err}"),
                "Failed to read file contents for debugging.",
            )
        }
    };

    let related_files = get_related_files(path, &file_content, fs).await;

    let cot_context = match scratchpad.as_deref() {
        Some(pad) => pad.extract_cot_for_debugging(
            &format!("{}\n{}", error_context.message, error_context.traceback),
            MAX_COT_ENTRIES,
            0.5,
        ),
        None => Vec::new(),
    };

    let prompt = build_prompt(error_context, &file_content, &related_files, &cot_context);

    if let Some(pad) = scratchpad.as_deref_mut() {
        pad.start_section(Section::Reasoning);
        pad.log(
            "DebuggingManager",
            "Full Debugging Reasoning",
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
        &prompt_data(prompt.clone(), FULL_DEBUG_TEMPERATURE),
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
                    &format!("Full debugging failed: {error}"),
                    LogLevel::Error,
                    Some(Section::Reasoning),
                    Default::default(),
                    Default::default(),
                );
                pad.end_section(Some(Section::Reasoning));
            }
            return TierOutcome::failure(format!("Debugging failed: {error}"), "LLM call failed during debugging attempt.");
        }
    };

    if let Some(pad) = scratchpad.as_deref_mut() {
        pad.log(
            "DebuggingManager",
            &format!("Debugging reasoning:\n{response}"),
            LogLevel::Info,
            Some(Section::Reasoning),
            Default::default(),
            Default::default(),
        );
    }

    let fixes = extract_multi_file_fixes(&response, Some(file_path));
    if fixes.is_empty() {
        if let Some(pad) = scratchpad.as_deref_mut() {
            pad.log(
                "DebuggingManager",
                "Could not extract file fixes from response",
                LogLevel::Warning,
                Some(Section::Reasoning),
                Default::default(),
                Default::default(),
            );
            pad.end_section(Some(Section::Reasoning));
        }
        return TierOutcome::failure("Debugging failed: could not extract fixes", response);
    }

    let reasoning = extract_reasoning_from_response(&response);

    if let Some(pad) = scratchpad.as_deref_mut() {
        pad.end_section(Some(Section::Reasoning));
    }

    let project_root = crate::context_helpers::get_project_root(path.parent().unwrap_or_else(|| Path::new(".")));

    let mut applied = std::collections::BTreeMap::new();
    for (dest, content) in &fixes {
        let dest_path = Path::new(dest);
        let exists = fs.exists(dest_path).await;
        if !exists && !is_safe_new_file(&project_root, dest_path) {
            if let Some(pad) = scratchpad.as_deref_mut() {
                pad.log(
                    "DebuggingManager",
                    &format!("Skipping invalid file path: {dest}"),
                    LogLevel::Warning,
                    None,
                    Default::default(),
                    Default::default(),
                );
            }
            continue;
        }
        if fs.write_file(dest_path, content).await.is_ok() {
            applied.insert(dest.clone(), content.clone());
        }
    }

    if applied.is_empty() {
        return TierOutcome::failure("No valid fixes found to apply", reasoning);
    }

    let mut metadata = std::collections::BTreeMap::new();
    metadata.insert("tier".to_string(), serde_json::Value::String("full_debugging".to_string()));
    metadata.insert("attempt".to_string(), serde_json::Value::from(attempt));

    TierOutcome {
        success: true,
        description: format!("Applied fixes to {} files", applied.len()),
        reasoning,
        changes: applied,
        duration_seconds: start.elapsed().as_secs_f64(),
        metadata,
    }
}
