use std::path::Path;

use debug_types::Section;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::format::decrypt_content;

/// One parsed entry recovered from a structured log section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionEntry {
    pub role: String,
    pub timestamp: String,
    pub content: String,
    pub level: Option<String>,
    pub section: Option<String>,
    pub relevance_score: Option<f64>,
}

fn entry_line_regex() -> Regex {
    Regex::new(r"^\[(.*?) • (.*?) • (.*?)\](?:\s+\[(.*?)\])?\s+(.*)$").expect("static pattern is valid")
}

/// Scan every log file for the current session, returning up to
/// `max_entries` parsed entries found between `SECTION_START`/`SECTION_END`
/// markers for `section`.
pub(super) fn extract_section_content(
    log_dir: &Path,
    session_id: &str,
    section: Section,
    max_entries: usize,
    include_metadata: bool,
    enable_encryption: bool,
    encryption_key: &str,
) -> Vec<SectionEntry> {
    let mut log_files: Vec<_> = std::fs::read_dir(log_dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|name| name.starts_with(&format!("scratchpad_{session_id}_")) && name.ends_with(".log"))
                .unwrap_or(false)
        })
        .collect();
    log_files.sort();

    let start_marker = super::format::section_start_marker(section.as_str());
    let end_marker = super::format::section_end_marker(section.as_str());

    let mut entries = Vec::new();
    let mut in_section = false;
    let mut section_lines: Vec<String> = Vec::new();

    'files: for log_file in log_files {
        let Ok(raw) = std::fs::read_to_string(&log_file) else {
            continue;
        };

        for line in raw.lines() {
            let line = if enable_encryption {
                match decrypt_content(line, encryption_key) {
                    Some(decrypted) => decrypted,
                    None => continue,
                }
            } else {
                line.to_string()
            };

            if line.contains(&start_marker) {
                in_section = true;
                section_lines.clear();
                continue;
            }

            if line.contains(&end_marker) {
                if in_section && !section_lines.is_empty() {
                    let processed = process_section_entries(&section_lines, include_metadata);
                    entries.extend(processed);
                    if entries.len() >= max_entries {
                        break 'files;
                    }
                }
                in_section = false;
                continue;
            }

            if in_section {
                section_lines.push(line);
            }
        }
    }

    entries.truncate(max_entries);
    entries
}

/// Parse raw lines captured inside a section into structured entries,
/// joining continuation lines that don't start a new header onto the
/// previous entry's content.
pub(super) fn process_section_entries(lines: &[String], include_metadata: bool) -> Vec<SectionEntry> {
    let regex = entry_line_regex();
    let mut processed = Vec::new();
    let mut current: Option<SectionEntry> = None;

    for line in lines {
        if let Some(captures) = regex.captures(line) {
            if let Some(entry) = current.take() {
                processed.push(entry);
            }
            let role = captures.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
            let timestamp = captures.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
            let level = captures.get(3).map(|m| m.as_str().to_string());
            let section = captures.get(4).map(|m| m.as_str().to_string());
            let content = captures.get(5).map(|m| m.as_str().to_string()).unwrap_or_default();

            current = Some(SectionEntry {
                role,
                timestamp,
                content,
                level: if include_metadata { level } else { None },
                section: if include_metadata { section } else { None },
                relevance_score: None,
            });
        } else if let Some(entry) = current.as_mut() {
            entry.content.push('\n');
            entry.content.push_str(line.trim());
        }
    }

    if let Some(entry) = current.take() {
        processed.push(entry);
    }

    processed
}

/// Fraction of `context`'s distinct (> 3 char, lowercased) word tokens
/// that appear in `content`.
pub(super) fn calculate_relevance_score(content: &str, context: &str) -> f64 {
    let content = content.to_lowercase();
    let context = context.to_lowercase();

    let terms: Vec<&str> = context
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|term| term.len() > 3)
        .collect();

    if terms.is_empty() {
        return 0.0;
    }

    let matches = terms.iter().filter(|term| content.contains(*term)).count();
    matches as f64 / terms.len() as f64
}

/// Find `Reasoning`/`Debugging` entries relevant to `error_context_text`,
/// sorted by relevance score descending, limited to `max_entries`.
pub(super) fn extract_cot_for_debugging(
    log_dir: &Path,
    session_id: &str,
    error_context_text: &str,
    max_entries: usize,
    relevance_threshold: f64,
    enable_encryption: bool,
    encryption_key: &str,
) -> Vec<SectionEntry> {
    let mut reasoning = extract_section_content(
        log_dir,
        session_id,
        Section::Reasoning,
        max_entries * 2,
        true,
        enable_encryption,
        encryption_key,
    );
    let debugging = extract_section_content(
        log_dir,
        session_id,
        Section::Debugging,
        max_entries,
        true,
        enable_encryption,
        encryption_key,
    );
    reasoning.extend(debugging);

    let mut scored: Vec<SectionEntry> = reasoning
        .into_iter()
        .filter_map(|mut entry| {
            let score = calculate_relevance_score(&entry.content, error_context_text);
            if score >= relevance_threshold {
                entry.relevance_score = Some(score);
                Some(entry)
            } else {
                None
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(max_entries);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_score_is_fraction_of_matching_terms() {
        let score = calculate_relevance_score(
            "connection refused while calling the database layer",
            "why did the database connection fail",
        );
        // terms > 3 chars: "database", "connection", "fail" (why/did too short)
        assert!(score > 0.0);
        assert!(score <= 1.0);
    }

    #[test]
    fn relevance_score_is_zero_with_no_qualifying_terms() {
        assert_eq!(calculate_relevance_score("anything", "a be to"), 0.0);
    }

    #[test]
    fn process_section_entries_joins_continuation_lines() {
        let lines = vec![
            "[Orchestrator • 2026-07-27T00:00:00Z • INFO] first line".to_string(),
            "  second line".to_string(),
        ];
        let processed = process_section_entries(&lines, false);
        assert_eq!(processed.len(), 1);
        assert!(processed[0].content.contains("first line"));
        assert!(processed[0].content.contains("second line"));
    }
}
