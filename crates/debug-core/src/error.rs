use std::path::PathBuf;

use thiserror::Error;

/// Errors from the pattern store's persistence layer (C1).
#[derive(Debug, Error)]
pub enum PatternStoreError {
    #[error("pattern store file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("permission denied accessing pattern store: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error accessing pattern store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed pattern store JSON at {path}: {message}")]
    MalformedJson { path: PathBuf, message: String },
}

impl PatternStoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors from the scratchpad's file I/O, rotation, and encryption (C3).
#[derive(Debug, Error)]
pub enum ScratchpadError {
    #[error("scratchpad log directory not found: {path}")]
    NotFound { path: PathBuf },

    #[error("permission denied writing scratchpad log: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error accessing scratchpad log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no open section to end")]
    NoOpenSection,

    #[error("encrypted session is missing a key")]
    MissingEncryptionKey,
}

impl ScratchpadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors surfaced by the LLM fabric (C4) that are NOT recovered locally
/// by the retry loop — i.e. non-retryable failures and exhaustion.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("unknown client method: {0}")]
    UnknownMethod(String),

    #[error("LLM call failed (non-retryable): {0}")]
    NonRetryable(String),

    #[error("LLM call exhausted {attempts} attempts, last error: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Unified error surfaced at `debug-core`'s public boundaries for
/// plumbing failures — pattern-store I/O, scratchpad I/O, config load,
/// and LLM client wiring. Explicit tier/orchestrator outcomes (success,
/// description, reasoning) are returned as typed result structs, not as
/// `Err` variants of this enum — see the per-tier result types.
#[derive(Debug, Error)]
pub enum DebugCoreError {
    #[error(transparent)]
    PatternStore(#[from] PatternStoreError),

    #[error(transparent)]
    Scratchpad(#[from] ScratchpadError),

    #[error(transparent)]
    Config(#[from] debug_types::ConfigError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("file system error accessing {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shell command {command} failed with exit code {code:?}")]
    ShellFailed { command: String, code: Option<i32> },
}
