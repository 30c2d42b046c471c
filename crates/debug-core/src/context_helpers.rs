//! Tier 2's related-file discovery: walk a file's imports/includes, resolve
//! them against its own directory and the detected project root, and read
//! back a bounded, truncated sample of whatever exists.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex_lite::Regex;

use crate::ports::FileSystem;

/// Upward directory markers that identify a project root.
const PROJECT_MARKERS: &[&str] = &["setup.py", "pyproject.toml", "package.json", ".git", "requirements.txt", "Pipfile", "poetry.lock"];

/// Import module names that never resolve to a file inside the project.
const STANDARD_LIBRARY_MODULES: &[&str] = &[
    "os", "sys", "re", "json", "time", "datetime", "logging", "math", "random", "collections", "itertools",
    "functools", "pathlib", "typing", "enum", "abc", "io", "glob", "urllib", "http", "email", "csv", "xml", "html",
    "sqlite3", "hashlib", "base64", "pickle", "copy", "inspect", "ast", "dis", "gc", "weakref", "contextvars",
    "concurrent", "asyncio", "multiprocessing", "threading", "queue", "socket", "ssl", "uuid", "decimal", "fractions",
    "statistics", "secrets", "tempfile", "shutil", "zipfile", "tarfile", "gzip", "bz2", "lzma", "zlib", "configparser",
    "argparse", "getopt", "warnings", "traceback", "unittest", "std", "core", "alloc",
];

/// Maximum number of related files to read back per call.
const MAX_RELATED_FILES: usize = 3;

/// Character cap each related file's content is truncated to.
const RELATED_FILE_TRUNCATE_CHARS: usize = 2000;

/// Maximum number of directory levels walked upward while looking for a
/// project root marker.
const MAX_PROJECT_ROOT_LEVELS: usize = 5;

fn import_module_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?:import|from)\s+([.\w]+)(?:\s+import|\s*$)"#).unwrap())
}

fn include_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"#include\s*[<"]([^">]+)[">]"#).unwrap())
}

fn require_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"require\(['"]([^'"]+)['"]\)"#).unwrap())
}

fn file_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"['"]([.\w/\\-]+\.(?:py|js|ts|rs|json|yaml|yml))['"]"#).unwrap())
}

fn is_standard_library_import(module: &str) -> bool {
    let root = module.split(['.', '/']).next().unwrap_or(module);
    STANDARD_LIBRARY_MODULES.contains(&root)
}

/// Walk upward from `start_dir` (at most [`MAX_PROJECT_ROOT_LEVELS`] levels)
/// looking for a directory containing one of [`PROJECT_MARKERS`]. Falls
/// back to `start_dir` itself if nothing is found.
pub fn get_project_root(start_dir: &Path) -> PathBuf {
    let mut current = start_dir.to_path_buf();
    for _ in 0..MAX_PROJECT_ROOT_LEVELS {
        if PROJECT_MARKERS.iter().any(|marker| current.join(marker).exists()) {
            return current;
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => break,
        }
    }
    start_dir.to_path_buf()
}

fn candidate_import_paths(module: &str, file_dir: &Path, project_root: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(relative) = module.strip_prefix('.') {
        let relative = relative.replace('.', std::path::MAIN_SEPARATOR_STR);
        candidates.push(file_dir.join(format!("{relative}.py")));
        candidates.push(file_dir.join(&relative).join("__init__.py"));
        return candidates;
    }

    let components: Vec<&str> = module.split('.').collect();
    let Some(&root_component) = components.first() else {
        return candidates;
    };
    candidates.push(project_root.join(format!("{root_component}.py")));
    candidates.push(project_root.join(root_component).join("__init__.py"));

    if components.len() > 1 {
        let mut nested = project_root.to_path_buf();
        for part in &components[..components.len() - 1] {
            nested = nested.join(part);
        }
        nested = nested.join(format!("{}.py", components[components.len() - 1]));
        candidates.push(nested);
    }

    candidates
}

fn truncate(content: String) -> String {
    if content.chars().count() <= RELATED_FILE_TRUNCATE_CHARS {
        return content;
    }
    let mut truncated: String = content.chars().take(RELATED_FILE_TRUNCATE_CHARS).collect();
    truncated.push_str("\n...(truncated)");
    truncated
}

/// Resolve the imports and bare file references in `content` against
/// `file_path`'s directory and its project root, and read back up to
/// [`MAX_RELATED_FILES`] of whichever resolve to a real, readable file,
/// each truncated to [`RELATED_FILE_TRUNCATE_CHARS`] characters.
pub async fn get_related_files(file_path: &Path, content: &str, fs: &dyn FileSystem) -> BTreeMap<String, String> {
    let file_dir = file_path.parent().unwrap_or_else(|| Path::new("."));
    let project_root = get_project_root(file_dir);

    let mut candidate_paths: Vec<PathBuf> = Vec::new();

    for caps in import_module_re().captures_iter(content) {
        let module = caps.get(1).unwrap().as_str();
        if is_standard_library_import(module) {
            continue;
        }
        candidate_paths.extend(candidate_import_paths(module, file_dir, &project_root));
    }

    for caps in include_re().captures_iter(content) {
        candidate_paths.push(file_dir.join(caps.get(1).unwrap().as_str()));
    }
    for caps in require_re().captures_iter(content) {
        candidate_paths.push(file_dir.join(caps.get(1).unwrap().as_str()));
    }
    for caps in file_reference_re().captures_iter(content) {
        candidate_paths.push(file_dir.join(caps.get(1).unwrap().as_str()));
    }

    let mut related = BTreeMap::new();
    for path in candidate_paths {
        if related.len() >= MAX_RELATED_FILES {
            break;
        }
        let key = path.display().to_string();
        if related.contains_key(&key) {
            continue;
        }
        if !fs.exists(&path).await {
            continue;
        }
        if let Ok(related_content) = fs.read_file(&path).await {
            if !related_content.is_empty() {
                related.insert(key, truncate(related_content));
            }
        }
    }

    related
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::test_doubles::InMemoryFileSystem;

    #[test]
    fn project_root_finds_marker_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pyproject.toml"), "").unwrap();
        let nested = dir.path().join("src").join("pkg");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(get_project_root(&nested), dir.path());
    }

    #[test]
    fn project_root_falls_back_to_start_dir_when_no_marker_found() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("c").join("d").join("e").join("f");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(get_project_root(&nested), nested);
    }

    #[tokio::test]
    async fn related_files_resolves_local_module_import() {
        let fs = InMemoryFileSystem::with_file("/project/helper.py", "def helper(): pass");
        let content = "import helper\n\ndef main():\n    helper.helper()\n";
        let related = get_related_files(Path::new("/project/main.py"), content, &fs).await;
        assert_eq!(related.get("/project/helper.py").unwrap(), "def helper(): pass");
    }

    #[tokio::test]
    async fn related_files_skips_standard_library_imports() {
        let fs = InMemoryFileSystem::default();
        let content = "import os\nimport sys\n";
        let related = get_related_files(Path::new("/project/main.py"), content, &fs).await;
        assert!(related.is_empty());
    }

    #[tokio::test]
    async fn related_files_truncates_large_content() {
        let big = "x".repeat(3000);
        let fs = InMemoryFileSystem::with_file("/project/big.py", big);
        let content = "import big\n";
        let related = get_related_files(Path::new("/project/main.py"), content, &fs).await;
        let value = related.get("/project/big.py").unwrap();
        assert!(value.len() < 3000);
        assert!(value.ends_with("(truncated)"));
    }
}
