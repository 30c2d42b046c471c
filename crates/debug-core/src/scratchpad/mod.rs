//! Structured chain-of-thought log with session management, size-based
//! rotation, optional XOR+base64 obfuscation, and relevance-scored
//! extraction for the debugging tiers to pull prior reasoning back in.

mod extract;
mod format;
mod rotation;

use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use debug_types::{DebugConfig, LogEntry, LogLevel, Section};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::ScratchpadError;

pub use extract::SectionEntry;

const MAX_RECENT_ENTRIES: usize = 100;

/// Record of the most recent LLM exchange, kept for explanation/debugging
/// UIs that want to show "what did the model just say".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmInteraction {
    pub role: String,
    pub prompt: String,
    pub response: String,
    pub status: String,
    pub prompt_summary: String,
    pub used_fallback: bool,
    pub error: Option<String>,
    pub timestamp: String,
}

pub struct Scratchpad {
    log_dir_path: PathBuf,
    session_id: String,
    current_log_file: PathBuf,
    current_part: u32,
    entry_count: u64,
    section_stack: Vec<Section>,
    last_llm_interaction: Option<LlmInteraction>,
    recent_entries: VecDeque<LogEntry>,

    max_file_size_mb: u64,
    enable_encryption: bool,
    encryption_key: String,
    prompt_explain_max_len: usize,
    response_explain_max_len: usize,
}

impl Scratchpad {
    /// Open (or create) the scratchpad's log directory, clean up old
    /// sessions, and log a session-start metadata entry — mirroring the
    /// original `EnhancedScratchpadManager.__init__`.
    pub fn open(log_dir_path: impl Into<PathBuf>, config: &DebugConfig) -> Result<Self, ScratchpadError> {
        let log_dir_path = log_dir_path.into();
        std::fs::create_dir_all(&log_dir_path).map_err(|source| ScratchpadError::io(&log_dir_path, source))?;

        let enable_encryption = config.scratchpad_encryption_key.is_some();
        let encryption_key = config.scratchpad_encryption_key.clone().unwrap_or_default();

        let session_id = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let current_log_file = session_log_file(&log_dir_path, &session_id, 1);

        rotation::cleanup_old_sessions(&log_dir_path, config.scratchpad_max_sessions);

        let mut scratchpad = Self {
            log_dir_path,
            session_id,
            current_log_file,
            current_part: 1,
            entry_count: 0,
            section_stack: Vec::new(),
            last_llm_interaction: None,
            recent_entries: VecDeque::new(),
            max_file_size_mb: config.scratchpad_max_file_size_mb,
            enable_encryption,
            encryption_key,
            prompt_explain_max_len: 1000,
            response_explain_max_len: 1000,
        };

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "session_id".to_string(),
            Value::String(scratchpad.session_id.clone()),
        );
        metadata.insert("encryption_enabled".to_string(), Value::Bool(enable_encryption));
        scratchpad.log(
            "SessionManager",
            &format!("Session {} started", scratchpad.session_id),
            LogLevel::Info,
            Some(Section::Metadata),
            metadata,
            Default::default(),
        );

        Ok(scratchpad)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Append a log entry, rotating first if the active file has grown
    /// past the configured size. Never fails the caller: I/O errors are
    /// reported via `tracing::warn!` and the entry is dropped.
    pub fn log(
        &mut self,
        role: &str,
        message: &str,
        level: LogLevel,
        section: Option<Section>,
        metadata: BTreeMap<String, Value>,
        tags: std::collections::BTreeSet<String>,
    ) {
        self.check_and_rotate_log();

        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            role: role.to_string(),
            level,
            section,
            message: message.to_string(),
            metadata,
            tags,
        };

        self.write_entry(entry);
    }

    fn check_and_rotate_log(&mut self) {
        let Ok(metadata) = std::fs::metadata(&self.current_log_file) else {
            return;
        };
        let size_mb = metadata.len() as f64 / (1024.0 * 1024.0);
        if size_mb < self.max_file_size_mb as f64 {
            return;
        }

        let previous_part = self.current_part;
        self.current_part += 1;
        self.current_log_file = session_log_file(&self.log_dir_path, &self.session_id, self.current_part);

        let mut rotation_metadata = BTreeMap::new();
        rotation_metadata.insert("previous_part".to_string(), Value::Number(previous_part.into()));
        rotation_metadata.insert("part".to_string(), Value::Number(self.current_part.into()));

        info!(part = self.current_part, "rotating scratchpad log");
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            role: "SessionManager".to_string(),
            level: LogLevel::Info,
            section: Some(Section::Metadata),
            message: format!("Log rotation - continuing in part {}", self.current_part),
            metadata: rotation_metadata,
            tags: Default::default(),
        };
        self.write_entry(entry);
    }

    fn write_entry(&mut self, entry: LogEntry) {
        if !rotation::is_within_log_dir(&self.log_dir_path, &self.current_log_file) {
            warn!(path = %self.current_log_file.display(), "refusing to write scratchpad entry outside log directory");
            return;
        }

        let mut formatted = format::format_entry(&entry);
        if self.enable_encryption {
            formatted = format::encrypt_content(&formatted, &self.encryption_key);
        }
        if !formatted.ends_with('\n') {
            formatted.push('\n');
        }

        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_log_file)
            .and_then(|mut file| file.write_all(formatted.as_bytes()));

        match result {
            Ok(()) => {
                self.entry_count += 1;
                self.recent_entries.push_back(entry);
                if self.recent_entries.len() > MAX_RECENT_ENTRIES {
                    self.recent_entries.pop_front();
                }
            }
            Err(err) => {
                warn!(path = %self.current_log_file.display(), error = %err, "failed to write scratchpad entry");
            }
        }
    }

    /// Push `section` and emit a start marker.
    pub fn start_section(&mut self, section: Section) {
        self.section_stack.push(section);
        let depth = self.section_stack.len();
        let mut metadata = BTreeMap::new();
        metadata.insert("section".to_string(), Value::String(section.as_str().to_string()));
        metadata.insert("action".to_string(), Value::String("start".to_string()));
        metadata.insert("depth".to_string(), Value::Number(depth.into()));

        self.log(
            "SectionManager",
            &format::section_start_marker(section.as_str()),
            LogLevel::Info,
            Some(section),
            metadata,
            Default::default(),
        );
    }

    /// Pop the current section, warning (and doing nothing) if `section`
    /// is given and doesn't match the top of the stack, or if the stack
    /// is empty.
    pub fn end_section(&mut self, section: Option<Section>) {
        let Some(&current) = self.section_stack.last() else {
            self.log(
                "SectionManager",
                "Warning: Attempted to end section but none are active",
                LogLevel::Warning,
                None,
                Default::default(),
                Default::default(),
            );
            return;
        };

        if let Some(requested) = section {
            if requested != current {
                self.log(
                    "SectionManager",
                    &format!(
                        "Warning: Attempted to end {} but {} is active",
                        requested.as_str(),
                        current.as_str()
                    ),
                    LogLevel::Warning,
                    None,
                    Default::default(),
                    Default::default(),
                );
                return;
            }
        }

        self.section_stack.pop();
        let depth = self.section_stack.len();
        let mut metadata = BTreeMap::new();
        metadata.insert("section".to_string(), Value::String(current.as_str().to_string()));
        metadata.insert("action".to_string(), Value::String("end".to_string()));
        metadata.insert("depth".to_string(), Value::Number(depth.into()));

        self.log(
            "SectionManager",
            &format::section_end_marker(current.as_str()),
            LogLevel::Info,
            Some(current),
            metadata,
            Default::default(),
        );
    }

    /// Record the most recent LLM exchange, truncated to the configured
    /// character limits, and log a summary entry.
    #[allow(clippy::too_many_arguments)]
    pub fn log_last_llm_interaction(
        &mut self,
        model: &str,
        prompt: &str,
        response: &str,
        prompt_summary: &str,
        used_fallback: bool,
        error: Option<&str>,
    ) {
        let truncated_prompt = truncate_with_notice(prompt, self.prompt_explain_max_len);
        let truncated_response = truncate_with_notice(response, self.response_explain_max_len);

        let status = if error.is_some() {
            "error"
        } else if used_fallback {
            "fallback_success"
        } else {
            "success"
        };

        self.last_llm_interaction = Some(LlmInteraction {
            role: model.to_string(),
            prompt: truncated_prompt,
            response: truncated_response,
            status: status.to_string(),
            prompt_summary: prompt_summary.to_string(),
            used_fallback,
            error: error.map(str::to_string),
            timestamp: Utc::now().to_rfc3339(),
        });

        let mut metadata = BTreeMap::new();
        metadata.insert("model".to_string(), Value::String(model.to_string()));
        metadata.insert("prompt_length".to_string(), Value::Number(prompt.chars().count().into()));
        metadata.insert(
            "response_length".to_string(),
            Value::Number(response.chars().count().into()),
        );
        metadata.insert("status".to_string(), Value::String(status.to_string()));
        metadata.insert("used_fallback".to_string(), Value::Bool(used_fallback));
        if let Some(error) = error {
            metadata.insert("error".to_string(), Value::String(error.to_string()));
        }

        let section = if error.is_some() { Some(Section::Error) } else { None };
        let level = if error.is_some() { LogLevel::Error } else { LogLevel::Info };
        let mut message = format!("LLM Interaction with {model}: {status}");
        if !prompt_summary.is_empty() {
            message.push_str(&format!(" - {prompt_summary}"));
        }

        self.log("LLM Interaction", &message, level, section, metadata, Default::default());
    }

    pub fn last_llm_interaction(&self) -> Option<&LlmInteraction> {
        self.last_llm_interaction.as_ref()
    }

    /// Most recent entries first, optionally filtered by level/section/
    /// role/tags (an entry must carry all requested tags).
    pub fn recent_entries(
        &self,
        count: usize,
        level: Option<LogLevel>,
        section: Option<Section>,
        role: Option<&str>,
        tags: Option<&[String]>,
    ) -> Vec<LogEntry> {
        let filtered: Vec<LogEntry> = self
            .recent_entries
            .iter()
            .filter(|e| level.map(|l| l == e.level).unwrap_or(true))
            .filter(|e| section.map(|s| Some(s) == e.section).unwrap_or(true))
            .filter(|e| role.is_none() || role == Some(e.role.as_str()))
            .filter(|e| tags.is_none() || tags.unwrap().iter().all(|tag| e.tags.contains(tag)))
            .cloned()
            .collect();

        let mut reversed: Vec<LogEntry> = filtered.into_iter().rev().collect();
        reversed.truncate(count);
        reversed
    }

    pub fn extract_section_content(
        &self,
        section: Section,
        max_entries: usize,
        include_metadata: bool,
    ) -> Vec<SectionEntry> {
        extract::extract_section_content(
            &self.log_dir_path,
            &self.session_id,
            section,
            max_entries,
            include_metadata,
            self.enable_encryption,
            &self.encryption_key,
        )
    }

    pub fn extract_cot_for_debugging(
        &self,
        error_context_text: &str,
        max_entries: usize,
        relevance_threshold: f64,
    ) -> Vec<SectionEntry> {
        extract::extract_cot_for_debugging(
            &self.log_dir_path,
            &self.session_id,
            error_context_text,
            max_entries,
            relevance_threshold,
            self.enable_encryption,
            &self.encryption_key,
        )
    }

    /// Log a session-end summary and close any sections left open.
    pub fn close(&mut self) {
        let mut metadata = BTreeMap::new();
        metadata.insert("session_id".to_string(), Value::String(self.session_id.clone()));
        metadata.insert("total_entries".to_string(), Value::Number(self.entry_count.into()));
        metadata.insert("parts".to_string(), Value::Number(self.current_part.into()));

        self.log(
            "SessionManager",
            &format!("Session {} closing - {} entries logged", self.session_id, self.entry_count),
            LogLevel::Info,
            None,
            metadata,
            Default::default(),
        );

        while !self.section_stack.is_empty() {
            self.end_section(None);
        }
    }
}

impl Drop for Scratchpad {
    fn drop(&mut self) {
        if !self.section_stack.is_empty() {
            self.close();
        }
    }
}

fn session_log_file(log_dir: &Path, session_id: &str, part: u32) -> PathBuf {
    log_dir.join(format!("scratchpad_{session_id}_part{part}.log"))
}

fn truncate_with_notice(text: &str, max_len: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_len {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_len).collect();
    format!("{truncated}... [truncated, {} chars omitted]", char_count - max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DebugConfig {
        let mut config = DebugConfig::default();
        config.scratchpad_max_file_size_mb = 50;
        config
    }

    #[test]
    fn open_creates_log_dir_and_writes_session_start_entry() {
        let dir = tempfile::tempdir().unwrap();
        let scratchpad = Scratchpad::open(dir.path().join("scratchpad"), &config()).unwrap();
        assert_eq!(scratchpad.entry_count(), 1);
    }

    #[test]
    fn log_appends_to_recent_entries_ring() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratchpad = Scratchpad::open(dir.path(), &config()).unwrap();
        scratchpad.log("tester", "hello", LogLevel::Info, None, Default::default(), Default::default());
        let recent = scratchpad.recent_entries(10, None, None, None, None);
        assert!(recent.iter().any(|e| e.message == "hello"));
    }

    #[test]
    fn start_and_end_section_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratchpad = Scratchpad::open(dir.path(), &config()).unwrap();
        scratchpad.start_section(Section::Reasoning);
        assert_eq!(scratchpad.section_stack.last(), Some(&Section::Reasoning));
        scratchpad.end_section(Some(Section::Reasoning));
        assert!(scratchpad.section_stack.is_empty());
    }

    #[test]
    fn end_section_mismatch_does_not_pop() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratchpad = Scratchpad::open(dir.path(), &config()).unwrap();
        scratchpad.start_section(Section::Reasoning);
        scratchpad.end_section(Some(Section::Debugging));
        assert_eq!(scratchpad.section_stack.last(), Some(&Section::Reasoning));
    }

    #[test]
    fn log_last_llm_interaction_is_retrievable() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratchpad = Scratchpad::open(dir.path(), &config()).unwrap();
        scratchpad.log_last_llm_interaction("generator", "prompt text", "response text", "summary", false, None);
        let interaction = scratchpad.last_llm_interaction().unwrap();
        assert_eq!(interaction.status, "success");
        assert_eq!(interaction.role, "generator");
    }

    #[test]
    fn log_last_llm_interaction_truncates_long_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratchpad = Scratchpad::open(dir.path(), &config()).unwrap();
        scratchpad.prompt_explain_max_len = 10;
        let long_prompt = "a".repeat(50);
        scratchpad.log_last_llm_interaction("generator", &long_prompt, "ok", "", false, None);
        let interaction = scratchpad.last_llm_interaction().unwrap();
        assert!(interaction.prompt.contains("truncated"));
    }

    #[test]
    fn extract_cot_for_debugging_scores_and_filters_by_relevance() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratchpad = Scratchpad::open(dir.path(), &config()).unwrap();

        scratchpad.start_section(Section::Reasoning);
        scratchpad.log(
            "planner",
            "the connection to the database timed out during migration",
            LogLevel::Info,
            Some(Section::Reasoning),
            Default::default(),
            Default::default(),
        );
        scratchpad.end_section(Some(Section::Reasoning));

        let results = scratchpad.extract_cot_for_debugging("database connection timeout", 5, 0.3);
        assert!(!results.is_empty());
        assert!(results[0].relevance_score.unwrap() > 0.0);
    }

    #[test]
    fn close_ends_any_open_sections() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratchpad = Scratchpad::open(dir.path(), &config()).unwrap();
        scratchpad.start_section(Section::Debugging);
        scratchpad.close();
        assert!(scratchpad.section_stack.is_empty());
    }
}
