//! Centralized path functions for all per-user debugging-engine storage
//! locations — single source of truth instead of ad-hoc `dirs::home_dir()`
//! joins scattered across the crate.

use std::path::PathBuf;

/// App home root: `~/.debug-engine/`.
pub fn app_home_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|d| d.join(".debug-engine"))
}

/// Pattern store persistence file: `<app_home_dir>/error_patterns.json`.
pub fn pattern_store_path() -> Option<PathBuf> {
    app_home_dir().map(|d| d.join("error_patterns.json"))
}

/// Per-user config overlay file: `<app_home_dir>/config.toml`.
pub fn user_config_path() -> Option<PathBuf> {
    app_home_dir().map(|d| d.join("config.toml"))
}

/// Scratchpad log directory root: `<app_home_dir>/logs/scratchpad`.
pub fn scratchpad_log_dir() -> Option<PathBuf> {
    app_home_dir().map(|d| d.join("logs").join("scratchpad"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_home_dir_is_dot_debug_engine() {
        let dir = app_home_dir().unwrap();
        assert!(dir.to_string_lossy().ends_with(".debug-engine"));
    }

    #[test]
    fn pattern_store_path_ends_with_json_file() {
        let path = pattern_store_path().unwrap();
        assert!(path.to_string_lossy().ends_with("error_patterns.json"));
    }

    #[test]
    fn scratchpad_log_dir_matches_documented_default() {
        let dir = scratchpad_log_dir().unwrap();
        assert!(dir.to_string_lossy().ends_with("logs/scratchpad"));
    }
}
