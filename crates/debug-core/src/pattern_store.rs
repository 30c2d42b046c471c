//! Multinomial naive-Bayes classifier with Laplace smoothing, used as the
//! fallback when the regex table in [`crate::classifier`] finds no match.
//!
//! Persistence is a single JSON document at a per-user path. Unlike the
//! original implementation (a bare `json.dump`), writes here go through a
//! temp-file-then-atomic-rename so a concurrent reader never observes a
//! half-written file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PatternStoreError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PatternStoreState {
    category_counts: BTreeMap<String, u64>,
    word_category_counts: BTreeMap<String, BTreeMap<String, u64>>,
}

/// Learns the association between error-message tokens and categories
/// from confirmed classifications, and predicts a category for messages
/// the regex table doesn't recognize.
pub struct PatternStore {
    path: PathBuf,
    state: PatternStoreState,
}

impl PatternStore {
    /// Load the store from `path`, tolerating a missing or corrupted file
    /// by resetting to empty in-memory state rather than failing.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(state) => state,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "pattern store file corrupted, resetting");
                    PatternStoreState::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => PatternStoreState::default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "pattern store unreadable, resetting");
                PatternStoreState::default()
            }
        };
        Self { path, state }
    }

    /// Tokenisation is fixed: split on whitespace, keep alphabetic runs,
    /// lowercase.
    pub fn tokenize(text: &str) -> Vec<String> {
        text.split_whitespace()
            .filter(|word| word.chars().all(|c| c.is_alphabetic()))
            .map(|word| word.to_lowercase())
            .collect()
    }

    /// Increment counts for `message`'s tokens under `category_name` and
    /// persist atomically. A no-op if tokenisation yields zero tokens.
    pub fn update(&mut self, message: &str, category_name: &str) -> Result<(), PatternStoreError> {
        let tokens = Self::tokenize(message);
        if tokens.is_empty() {
            return Ok(());
        }

        *self.state.category_counts.entry(category_name.to_string()).or_insert(0) += 1;
        let words = self
            .state
            .word_category_counts
            .entry(category_name.to_string())
            .or_default();
        for token in tokens {
            *words.entry(token).or_insert(0) += 1;
        }

        self.persist()
    }

    /// Return the category with the highest Laplace-smoothed log-posterior,
    /// or `None` if the store has never seen a confirmed category or
    /// `message` tokenises to nothing.
    pub fn predict(&self, message: &str) -> Option<String> {
        let tokens = Self::tokenize(message);
        if tokens.is_empty() || self.state.category_counts.is_empty() {
            return None;
        }

        let total_documents: u64 = self.state.category_counts.values().sum();
        let mut best: Option<(String, f64)> = None;

        for (category, doc_count) in &self.state.category_counts {
            let prior = (*doc_count as f64) / (total_documents as f64);
            let mut log_prob = prior.ln();

            let empty = BTreeMap::new();
            let word_counts = self.state.word_category_counts.get(category).unwrap_or(&empty);
            let vocab_size = word_counts.len() as f64;
            let total_word_count: u64 = word_counts.values().sum();

            for token in &tokens {
                let count = *word_counts.get(token).unwrap_or(&0) as f64;
                let probability = (count + 1.0) / (total_word_count as f64 + vocab_size);
                log_prob += probability.ln();
            }

            let is_better = match &best {
                Some((_, best_log_prob)) => log_prob > *best_log_prob,
                None => true,
            };
            if is_better {
                best = Some((category.clone(), log_prob));
            }
        }

        best.map(|(category, _)| category)
    }

    fn persist(&self) -> Result<(), PatternStoreError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|source| PatternStoreError::io(parent, source))?;

        let json = serde_json::to_string_pretty(&self.state).expect("state always serializes");
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|source| PatternStoreError::io(&tmp_path, source))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|source| PatternStoreError::io(&self.path, source))?;
        debug!(path = %self.path.display(), "pattern store persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_at(dir: &tempfile::TempDir) -> PatternStore {
        PatternStore::load(dir.path().join("patterns.json"))
    }

    #[test]
    fn tokenize_keeps_only_alphabetic_runs_lowercased() {
        let tokens = PatternStore::tokenize("NameError: name 'foo123' is not defined!");
        assert_eq!(tokens, vec!["nameerror", "name", "is", "not", "defined"]);
    }

    #[test]
    fn update_is_a_no_op_when_no_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(&dir);
        store.update("123 456", "SYNTAX").unwrap();
        assert!(store.predict("anything").is_none());
    }

    #[test]
    fn predict_returns_none_for_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);
        assert_eq!(store.predict("name error here"), None);
    }

    #[test]
    fn predict_favors_the_trained_category() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(&dir);
        for _ in 0..5 {
            store.update("connection refused by remote host", "NETWORK").unwrap();
        }
        for _ in 0..5 {
            store.update("list index out of range", "INDEX").unwrap();
        }

        assert_eq!(store.predict("connection refused"), Some("NETWORK".to_string()));
        assert_eq!(store.predict("index out of range"), Some("INDEX".to_string()));
    }

    #[test]
    fn state_survives_a_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        {
            let mut store = PatternStore::load(&path);
            store.update("connection refused", "NETWORK").unwrap();
        }
        let reloaded = PatternStore::load(&path);
        assert_eq!(reloaded.predict("connection refused"), Some("NETWORK".to_string()));
    }

    #[test]
    fn corrupted_file_resets_to_empty_state_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        std::fs::write(&path, "not valid json{{{").unwrap();
        let store = PatternStore::load(&path);
        assert_eq!(store.predict("anything"), None);
    }
}
