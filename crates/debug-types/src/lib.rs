//! Shared data model for the three-tier debugging engine: error taxonomy,
//! debugging phases, restart strategies, and the attempt/context records
//! that flow between the pattern store, classifier, scratchpad, and
//! orchestrator crates.

mod category;
mod config;
mod context;
mod log_entry;
mod phase;
mod restart;

pub use category::ErrorCategory;
pub use config::{ConfigError, DebugConfig};
pub use context::{DebugAttempt, ErrorContext, TestFailureMetadata};
pub use log_entry::{LogEntry, LogLevel, Section};
pub use phase::DebuggingPhase;
pub use restart::RestartStrategy;
