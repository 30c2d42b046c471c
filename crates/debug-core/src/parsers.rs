//! Pulls structured content (code, reasoning, per-file fixes, JSON) back out
//! of free-form LLM responses. Every parser here is a best-effort regex
//! scrape, not a real markdown/JSON parser — a response that doesn't follow
//! the expected shape degrades to `None`/empty rather than erroring.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde_json::Value;

fn code_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:\w*\n|\n)?(.*?)```").unwrap())
}

fn fix_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)## Fix\s*\n(.*?)(?:\n##|$)").unwrap())
}

fn fenced_wrapper_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```\w*\s*|```\s*$").unwrap())
}

/// Largest fenced code block in the response, or the content of a `## Fix`
/// heading if no fences are present.
pub fn extract_code_from_response(response: &str) -> Option<String> {
    let blocks: Vec<&str> = code_block_re()
        .captures_iter(response)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    if let Some(largest) = blocks.into_iter().max_by_key(|block| block.len()) {
        return Some(largest.to_string());
    }

    let captures = fix_heading_re().captures(response)?;
    let code = captures.get(1)?.as_str().trim();
    let code = fenced_wrapper_re().replace_all(code, "");
    Some(code.trim().to_string())
}

fn analysis_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)(?:##\s*Analysis|Step-by-Step Analysis)\s*\n(.*?)(?:\n##|$)").unwrap())
}

fn explanation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)(?:##\s*Explanation)\s*\n(.*?)(?:\n##|$)").unwrap())
}

fn root_cause_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)(?:##\s*Root Cause)\s*\n(.*?)(?:\n##|$)").unwrap())
}

/// Concatenation of the response's Analysis / Root Cause / Explanation
/// sections, in that order, or the first 500 characters of the raw
/// response if none are present.
pub fn extract_reasoning_from_response(response: &str) -> String {
    let mut parts = Vec::new();

    if let Some(caps) = analysis_re().captures(response) {
        parts.push(caps.get(1).unwrap().as_str().trim().to_string());
    }
    if let Some(caps) = root_cause_re().captures(response) {
        parts.push(format!("Root Cause: {}", caps.get(1).unwrap().as_str().trim()));
    }
    if let Some(caps) = explanation_re().captures(response) {
        parts.push(caps.get(1).unwrap().as_str().trim().to_string());
    }

    if !parts.is_empty() {
        return parts.join("\n\n");
    }

    let mut truncated: String = response.chars().take(500).collect();
    if response.chars().count() > 500 {
        truncated.push_str("...");
    }
    truncated
}

fn filepath_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```filepath:(.*?)\n(.*?)```").unwrap())
}

/// Per-file fixes declared with ` ```filepath:path/to/file ` fences, or a
/// single fallback entry under `fallback_file_path` if the response only
/// has one undecorated code block.
pub fn extract_multi_file_fixes(response: &str, fallback_file_path: Option<&str>) -> BTreeMap<String, String> {
    let mut fixes = BTreeMap::new();

    for caps in filepath_block_re().captures_iter(response) {
        let path = caps.get(1).unwrap().as_str().trim().to_string();
        let content = caps.get(2).unwrap().as_str().to_string();
        fixes.insert(path, content);
    }

    if fixes.is_empty() {
        if let (Some(code), Some(path)) = (extract_code_from_response(response), fallback_file_path) {
            fixes.insert(path.to_string(), code);
        }
    }

    fixes
}

fn json_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap())
}

/// JSON object found in a ` ```json ` fence, or failing that the span
/// between the first `{` and the last `}` in the response.
pub fn extract_json_from_response(response: &str) -> Option<Value> {
    if let Some(caps) = json_fence_re().captures(response) {
        if let Ok(value) = serde_json::from_str(caps.get(1).unwrap().as_str()) {
            return Some(value);
        }
    }

    longest_brace_balanced_value(response)
}

/// Every brace-balanced `{...}` span in `text`, string-literal aware so that
/// braces inside quoted JSON strings don't desynchronise the depth count.
/// Tried longest-first and the first one that parses as JSON wins, per the
/// "longest brace-balanced substring that parses" contract.
fn longest_brace_balanced_value(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut spans: Vec<(usize, usize)> = Vec::new();

    for start in 0..bytes.len() {
        if bytes[start] != b'{' {
            continue;
        }
        let mut depth = 0i32;
        let mut in_string = false;
        let mut escaped = false;
        for (offset, &b) in bytes[start..].iter().enumerate() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        spans.push((start, start + offset + 1));
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    spans.sort_by_key(|(start, end)| std::cmp::Reverse(end - start));
    for (start, end) in spans {
        if let Ok(value) = serde_json::from_str(&text[start..end]) {
            return Some(value);
        }
    }
    None
}

fn restart_strategy_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)(?:##\s*Restart Strategy|Strategy)\s*:\s*(.*?)(?:\n##|$)").unwrap())
}

fn restart_strategy_bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:Strategy|Approach)\s*:\s*\*\s*(.*?)(?:\n|$)").unwrap())
}

/// Restart-strategy prose from a `## Restart Strategy:` heading, or a
/// `Strategy: * ...` bullet line.
pub fn extract_restart_strategy_from_response(response: &str) -> Option<String> {
    if let Some(caps) = restart_strategy_heading_re().captures(response) {
        return Some(caps.get(1).unwrap().as_str().trim().to_string());
    }
    restart_strategy_bullet_re()
        .captures(response)
        .map(|caps| caps.get(1).unwrap().as_str().trim().to_string())
}

const ERROR_CATEGORIES: &[&str] = &[
    "syntax_error",
    "type_error",
    "import_error",
    "runtime_error",
    "test_failure",
    "dependency_error",
    "configuration_error",
];

/// First known error-category token (underscored or spaced) mentioned in
/// the response, case-insensitively.
pub fn extract_error_category_from_response(response: &str) -> Option<String> {
    let lower = response.to_lowercase();
    ERROR_CATEGORIES
        .iter()
        .find(|category| lower.contains(&category.replace('_', " ")) || lower.contains(*category))
        .map(|category| category.to_string())
}
