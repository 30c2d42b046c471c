// crates/debug-cli/src/main.rs
//! Operator-facing entry point for the three-tier debugging engine.
//!
//! The LLM client, planner, and code generator are external collaborators
//! (§6) this crate only consumes through traits — there is no bundled
//! wire-protocol client to drive a full `handle_error` episode from the
//! command line. What the CLI does expose is the deterministic core:
//! classification, pattern-store training/inspection, and scratchpad
//! inspection, which is enough to operate and debug the engine itself.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use debug_core::classifier::categorize_error;
use debug_core::pattern_store::PatternStore;
use debug_core::paths;
use debug_core::scratchpad::Scratchpad;
use debug_types::{DebugConfig, Section};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "debug-engine", version, about = "Three-tier debugging engine operator CLI")]
struct Cli {
    /// Override the pattern-store path (defaults to ~/.debug-engine/error_patterns.json).
    #[arg(long, global = true)]
    pattern_store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify a (message, traceback) pair into an error category.
    Classify {
        /// The raw error message.
        message: String,
        /// Optional traceback/stack trace text.
        #[arg(long, default_value = "")]
        traceback: String,
    },
    /// Classify and print the orchestrator's severity/fix-approach/tier
    /// recommendation for a standalone error, without running an episode.
    Analyze {
        message: String,
        #[arg(long, default_value = "")]
        traceback: String,
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        line: Option<u32>,
    },
    /// Train the pattern-store naive-Bayes model with a confirmed category.
    Train {
        message: String,
        /// Category name, e.g. "Type", "Network", "Unknown".
        category: String,
    },
    /// Ask the pattern store alone (no regex table) to predict a category.
    Predict { message: String },
    /// Print the tail of the current scratchpad session's recent entries.
    ScratchpadTail {
        /// Number of recent entries to print (default 20).
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    let pattern_store_path = cli
        .pattern_store
        .or_else(paths::pattern_store_path)
        .ok_or_else(|| anyhow::anyhow!("could not determine pattern-store path; pass --pattern-store explicitly"))?;

    match cli.command {
        Command::Classify { message, traceback } => {
            let store = PatternStore::load(&pattern_store_path);
            let category = categorize_error(&message, &traceback, &store);
            println!("{}", category.as_str());
        }
        Command::Analyze {
            message,
            traceback,
            file,
            line,
        } => {
            let store = PatternStore::load(&pattern_store_path);
            let config = DebugConfig::default();
            let orchestrator = debug_core::Orchestrator::new(store, config, "cli-analysis", "unknown");
            let report = orchestrator.analyze_error(&message, &traceback, file.as_deref(), line);
            println!("category:          {}", report.context.category.as_str());
            println!("severity:          {}", report.severity);
            println!("fix_approach:      {}", report.fix_approach);
            println!("recommended_tier:  {:?}", report.recommended_tier);
            println!("similar_history:   {} prior attempt(s)", report.similar_history.len());
        }
        Command::Train { message, category } => {
            let mut store = PatternStore::load(&pattern_store_path);
            store.update(&message, &category)?;
            println!("trained on {} tokens under category {}", PatternStore::tokenize(&message).len(), category);
        }
        Command::Predict { message } => {
            let store = PatternStore::load(&pattern_store_path);
            match store.predict(&message) {
                Some(category) => println!("{category}"),
                None => println!("(no prediction — pattern store is empty or message has no tokens)"),
            }
        }
        Command::ScratchpadTail { count } => {
            let log_dir = paths::scratchpad_log_dir()
                .ok_or_else(|| anyhow::anyhow!("could not determine scratchpad log directory"))?;
            let config = DebugConfig::default();
            let mut pad = Scratchpad::open(&log_dir, &config)?;
            pad.start_section(Section::UserInteraction);
            for entry in pad.recent_entries(count, None, None, None, None) {
                println!(
                    "[{} \u{2022} {} \u{2022} {:?}] {}",
                    entry.role, entry.timestamp, entry.level, entry.message
                );
            }
            pad.end_section(Some(Section::UserInteraction));
        }
    }

    Ok(())
}
