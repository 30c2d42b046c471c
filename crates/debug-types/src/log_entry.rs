use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of a scratchpad log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

/// A chain-of-thought section the scratchpad groups entries under.
/// Sections nest: `start_section` pushes, `end_section` pops the
/// matching frame off a LIFO stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Section {
    Planning,
    Generation,
    Debugging,
    Testing,
    Analysis,
    Implementation,
    Error,
    Reasoning,
    Decision,
    Metadata,
    UserInteraction,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "PLANNING",
            Self::Generation => "GENERATION",
            Self::Debugging => "DEBUGGING",
            Self::Testing => "TESTING",
            Self::Analysis => "ANALYSIS",
            Self::Implementation => "IMPLEMENTATION",
            Self::Error => "ERROR",
            Self::Reasoning => "REASONING",
            Self::Decision => "DECISION",
            Self::Metadata => "METADATA",
            Self::UserInteraction => "USER_INTERACTION",
        }
    }
}

/// One structured entry in the scratchpad's chain-of-thought log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub role: String,
    #[serde(default)]
    pub level: LogLevel,
    pub section: Option<Section>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl LogEntry {
    pub fn new(timestamp: impl Into<String>, role: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            role: role.into(),
            level: LogLevel::Info,
            section: None,
            message: message.into(),
            metadata: BTreeMap::new(),
            tags: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let mut entry = LogEntry::new("2026-07-27T00:00:00Z", "orchestrator", "starting tier 2");
        entry.level = LogLevel::Warning;
        entry.section = Some(Section::Debugging);
        entry.tags.insert("tier2".into());

        let json = serde_json::to_string(&entry).unwrap();
        let back: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }

    #[test]
    fn default_level_is_info() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }
}
