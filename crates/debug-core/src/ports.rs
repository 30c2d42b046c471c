//! The five collaborator interfaces the debugging engine calls out
//! through: a filesystem, a shell, an LLM client, a planner, and a code
//! generator. Only `FileSystem` and `ShellRunner` get real,
//! process/filesystem-backed implementations here — `LlmClient`,
//! `Planner`, and `CodeGenerator` are genuinely external systems (an
//! HTTP-calling model, the planning pipeline, the code generator) that
//! this crate only consumes through the trait boundary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::llm::{LlmCallError, PromptData};

/// Reads, writes, and existence checks against the project tree. Writes
/// are atomic from the caller's perspective (temp-file-then-rename).
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_file(&self, path: &Path) -> std::io::Result<String>;
    async fn write_file(&self, path: &Path, contents: &str) -> std::io::Result<()>;
    async fn exists(&self, path: &Path) -> bool;
}

/// Runs a shell command with an optional timeout, returning its exit
/// code and combined output.
#[async_trait]
pub trait ShellRunner: Send + Sync {
    async fn run_command(&self, command: &str, timeout: Option<Duration>) -> std::io::Result<ShellOutput>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub exit_code: Option<i32>,
    pub output: String,
}

/// A method-dispatched LLM backend: `call_llm_with_retry` resolves
/// `method_name` against this trait's single entry point rather than
/// against distinct Rust methods, matching the spec's "configured method
/// name" contract.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn call(&self, method_name: &str, prompt_data: &PromptData) -> Result<String, LlmCallError>;

    /// Optional hook: attach a previously cached KV artefact so the next
    /// `call` can reuse precomputed attention state for a shared prompt
    /// prefix. Clients without prefix reuse support can ignore this.
    fn attach_kv_hint(&self, _kv_handle: &str) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanResult {
    pub success: bool,
    pub plan: String,
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn generate_plan(&self, task: &str, context: Option<&BTreeMap<String, String>>) -> PlanResult;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeGenResult {
    pub success: bool,
    pub files: BTreeMap<String, String>,
}

#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate_code(
        &self,
        task: &str,
        plan: &str,
        tech_stack: &str,
        max_token_count: Option<u32>,
    ) -> CodeGenResult;
}

/// File extensions the "safe new file" predicate allows.
const SAFE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "jsx", "tsx", "json", "yaml", "yml", "toml", "ini", "cfg", "md",
];

/// Dotfile/dotfolder names allowed despite the leading-dot rule.
const DOTFILE_ALLOW_LIST: &[&str] = &[".github", ".vscode", ".env"];

/// Path-component substrings that disqualify a path regardless of
/// extension (case-insensitive).
const FORBIDDEN_SUBSTRINGS: &[&str] = &["secret", "secrets", "password", "credentials", "private"];

/// A proposed new file path is safe iff, after resolving symlinks, it
/// lies within `project_root`; no path component begins with `.` except
/// the dotfile allow-list; no component contains a forbidden substring;
/// and its extension is in the safe extension list.
pub fn is_safe_new_file(project_root: &Path, candidate: &Path) -> bool {
    let resolved = match resolve_best_effort(candidate) {
        Some(path) => path,
        None => return false,
    };
    let root = match resolve_best_effort(project_root) {
        Some(path) => path,
        None => return false,
    };
    let Ok(relative) = resolved.strip_prefix(&root) else {
        return false;
    };

    for component in relative.components() {
        let Some(name) = component.as_os_str().to_str() else {
            return false;
        };
        if name.starts_with('.') && !DOTFILE_ALLOW_LIST.contains(&name) {
            return false;
        }
        let lower = name.to_lowercase();
        if FORBIDDEN_SUBSTRINGS.iter().any(|bad| lower.contains(bad)) {
            return false;
        }
    }

    match candidate.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => SAFE_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

fn resolve_best_effort(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = path.canonicalize() {
        return Some(resolved);
    }
    let parent = path.parent()?.canonicalize().ok()?;
    Some(parent.join(path.file_name()?))
}

/// Real, filesystem-backed [`FileSystem`]. Writes go through a
/// temp-file-then-atomic-rename so a crash or concurrent reader never
/// observes partial content.
pub struct RealFileSystem;

#[async_trait]
impl FileSystem for RealFileSystem {
    async fn read_file(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn write_file(&self, path: &Path, contents: &str) -> std::io::Result<()> {
        let tmp_path = path.with_extension(format!(
            "{}.tmp",
            path.extension().and_then(|e| e.to_str()).unwrap_or("")
        ));
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }
}

/// Real, process-spawning [`ShellRunner`] with a hard timeout.
pub struct RealShellRunner;

#[async_trait]
impl ShellRunner for RealShellRunner {
    async fn run_command(&self, command: &str, timeout: Option<Duration>) -> std::io::Result<ShellOutput> {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command).stdout(Stdio::piped()).stderr(Stdio::piped());

        let run = async {
            let output = cmd.output().await?;
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            Ok::<ShellOutput, std::io::Error>(ShellOutput {
                exit_code: output.status.code(),
                output: combined,
            })
        };

        match timeout {
            Some(duration) => match tokio::time::timeout(duration, run).await {
                Ok(result) => {
                    info!(command, "shell command completed");
                    result
                }
                Err(_) => {
                    warn!(command, timeout_secs = duration.as_secs(), "shell command timed out");
                    Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "shell command timed out"))
                }
            },
            None => run.await,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_file_inside_root_with_allowed_extension() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("src").join("lib.py");
        std::fs::create_dir_all(candidate.parent().unwrap()).unwrap();
        assert!(is_safe_new_file(dir.path(), &candidate));
    }

    #[test]
    fn rejects_disallowed_extension() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("binary.exe");
        assert!(!is_safe_new_file(dir.path(), &candidate));
    }

    #[test]
    fn rejects_forbidden_substrings_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("SECRETS").join("config.json");
        std::fs::create_dir_all(candidate.parent().unwrap()).unwrap();
        assert!(!is_safe_new_file(dir.path(), &candidate));
    }

    #[test]
    fn allows_dotfile_allow_list_entries() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join(".github").join("workflows.yml");
        std::fs::create_dir_all(candidate.parent().unwrap()).unwrap();
        assert!(is_safe_new_file(dir.path(), &candidate));
    }

    #[test]
    fn rejects_other_dotfiles() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join(".ssh").join("id_rsa.json");
        std::fs::create_dir_all(candidate.parent().unwrap()).unwrap();
        assert!(!is_safe_new_file(dir.path(), &candidate));
    }
}
