use std::path::Path;

use serde::{Deserialize, Serialize};

/// Everything that governs the debugging engine's runtime behaviour:
/// LLM retry/backoff, per-tier attempt ceilings, and the scratchpad's
/// rotation policy. Constructed with [`DebugConfig::default`] and
/// optionally overlaid with a per-user TOML file via [`DebugConfig::load`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub llm_default_timeout: f64,
    pub llm_max_retries: u32,
    pub llm_initial_backoff: f64,
    pub llm_backoff_factor: f64,
    pub llm_fallback_strategy: String,

    pub prefix_cache_token_window: usize,
    pub prefix_cache_max_entries: usize,
    pub semantic_cache_max_entries: usize,

    pub max_generator_attempts: u32,
    pub max_debugger_attempts: u32,
    pub max_restart_attempts: u32,

    pub scratchpad_max_sessions: usize,
    pub scratchpad_max_file_size_mb: u64,
    pub scratchpad_log_dir: String,
    pub scratchpad_encryption_key: Option<String>,

    pub github_oauth_token: Option<String>,
    pub supabase_base_url: Option<String>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            llm_default_timeout: 60.0,
            llm_max_retries: 3,
            llm_initial_backoff: 1.0,
            llm_backoff_factor: 2.0,
            llm_fallback_strategy: "none".to_string(),

            prefix_cache_token_window: 50,
            prefix_cache_max_entries: 256,
            semantic_cache_max_entries: 512,

            max_generator_attempts: 2,
            max_debugger_attempts: 3,
            max_restart_attempts: 2,

            scratchpad_max_sessions: 5,
            scratchpad_max_file_size_mb: 50,
            scratchpad_log_dir: "logs/scratchpad".to_string(),
            scratchpad_encryption_key: None,

            github_oauth_token: None,
            supabase_base_url: None,
        }
    }
}

/// Error loading a `DebugConfig` from a TOML file. A missing file is not
/// an error — callers get `Default::default()` back silently, matching
/// the original Python `user_config.py` fallback.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path} as TOML: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl DebugConfig {
    /// Load a per-user TOML config and overlay it onto the defaults.
    /// A missing file falls back silently to [`DebugConfig::default`];
    /// unknown keys in the file are ignored by `serde(default)`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DebugConfig::default();
        assert_eq!(config.llm_max_retries, 3);
        assert_eq!(config.llm_initial_backoff, 1.0);
        assert_eq!(config.llm_backoff_factor, 2.0);
        assert_eq!(config.max_generator_attempts, 2);
        assert_eq!(config.max_debugger_attempts, 3);
        assert_eq!(config.max_restart_attempts, 2);
        assert_eq!(config.scratchpad_max_sessions, 5);
        assert_eq!(config.scratchpad_max_file_size_mb, 50);
    }

    #[test]
    fn load_falls_back_to_defaults_when_file_is_missing() {
        let config = DebugConfig::load(Path::new("/nonexistent/debug-config.toml")).unwrap();
        assert_eq!(config, DebugConfig::default());
    }

    #[test]
    fn load_overlays_partial_toml_onto_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "llm_max_retries = 5\nunused_future_key = true\n").unwrap();

        let config = DebugConfig::load(&path).unwrap();
        assert_eq!(config.llm_max_retries, 5);
        assert_eq!(config.llm_initial_backoff, DebugConfig::default().llm_initial_backoff);
    }
}
