//! The three-tier debugging engine: a pattern-learned, regex-first error
//! classifier (C1/C2) feeding a tiered recovery orchestrator (C9) that
//! escalates quick fix → full debug → strategic restart (C6/C7/C8), backed
//! by a structured Chain-of-Thought scratchpad (C3), a retrying/caching LLM
//! fabric (C4/C5), and a code-generation validation loop (C10) that
//! delegates persistent failures back to the orchestrator.

pub mod classifier;
pub mod codegen;
pub mod context_helpers;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod parsers;
pub mod paths;
pub mod pattern_store;
pub mod ports;
pub mod scratchpad;
pub mod tiers;

pub use error::DebugCoreError;
pub use orchestrator::{AnalysisReport, DebugStats, Orchestrator};
