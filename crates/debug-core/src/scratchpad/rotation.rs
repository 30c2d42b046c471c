use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex_lite::Regex;
use tracing::warn;

/// `scratchpad_<YYYYMMDD_HHMMSS>_part<N>.log`
fn session_filename_regex() -> Regex {
    Regex::new(r"^scratchpad_(\d{8}_\d{6})_part(\d+)\.log$").expect("static pattern is valid")
}

/// Refuse any resolved path that escapes `log_dir` — a canonicalized
/// symlink-escape defence the original implementation didn't have.
pub(super) fn is_within_log_dir(log_dir: &Path, candidate: &Path) -> bool {
    let Ok(log_dir) = log_dir.canonicalize() else {
        return false;
    };
    let resolved = match candidate.canonicalize() {
        Ok(path) => path,
        // A file that doesn't exist yet (e.g. the next log part) can't be
        // canonicalized; fall back to checking its parent directory.
        Err(_) => match candidate.parent().and_then(|p| p.canonicalize().ok()) {
            Some(parent) => parent,
            None => return false,
        },
    };
    resolved.starts_with(&log_dir)
}

/// Delete files belonging to the oldest sessions once the distinct
/// session count meets or exceeds `max_sessions`.
pub(super) fn cleanup_old_sessions(log_dir: &Path, max_sessions: usize) {
    let entries = match std::fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    let regex = session_filename_regex();
    let mut sessions: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(captures) = regex.captures(name) {
            let session_id = captures.get(1).unwrap().as_str().to_string();
            sessions.entry(session_id).or_default().push(path);
        }
    }

    if sessions.len() < max_sessions {
        return;
    }

    // Sessions sort lexicographically by id, which is also chronological
    // because the id is `YYYYMMDD_HHMMSS`.
    let sessions_to_remove = sessions.len().saturating_sub(max_sessions) + 1;
    for (_, files) in sessions.into_iter().take(sessions_to_remove) {
        for file in files {
            if let Err(err) = std::fs::remove_file(&file) {
                warn!(path = %file.display(), error = %err, "failed to remove old scratchpad session file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_matches_session_filenames() {
        let regex = session_filename_regex();
        let caps = regex.captures("scratchpad_20260727_120000_part3.log").unwrap();
        assert_eq!(caps.get(1).unwrap().as_str(), "20260727_120000");
        assert_eq!(caps.get(2).unwrap().as_str(), "3");
    }

    #[test]
    fn cleanup_keeps_only_the_newest_sessions() {
        let dir = tempfile::tempdir().unwrap();
        for (session, parts) in [("20260101_000000", 1), ("20260102_000000", 1), ("20260103_000000", 2)] {
            for part in 1..=parts {
                std::fs::write(dir.path().join(format!("scratchpad_{session}_part{part}.log")), "x").unwrap();
            }
        }

        cleanup_old_sessions(dir.path(), 2);

        let remaining: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok().map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect();
        assert!(!remaining.iter().any(|f| f.contains("20260101_000000")));
        assert!(remaining.iter().any(|f| f.contains("20260103_000000")));
    }

    #[test]
    fn path_within_log_dir_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("scratchpad_1_part1.log");
        std::fs::write(&file, "x").unwrap();
        assert!(is_within_log_dir(dir.path(), &file));
    }

    #[test]
    fn path_outside_log_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let file = outside.path().join("escape.log");
        std::fs::write(&file, "x").unwrap();
        assert!(!is_within_log_dir(dir.path(), &file));
    }
}
