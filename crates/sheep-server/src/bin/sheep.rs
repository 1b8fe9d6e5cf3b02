//! sheep - command-line memory tools
//!
//! Drives the five agent tools (remember / recall / why / forget /
//! correct) against the local per-agent store, plus a stats report.
//! Results print as pretty JSON so the output can be piped.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};

use sheep_core::{tools, MemoryStore, RecallEngine};

#[derive(Debug, Parser)]
#[command(name = "sheep", version, about = "Per-agent cognitive memory tools")]
struct Cli {
    /// Agent whose store to open
    #[arg(long, env = "SHEEP_AGENT_ID", default_value = "default")]
    agent: String,

    /// Custom store file (defaults to ~/.clawdbot/sheep/<agent>.sqlite)
    #[arg(long)]
    store_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a user-affirmed fact
    Remember {
        /// Relation, e.g. works_at, likes, name_is
        predicate: String,
        /// The value of the fact
        object: String,
        /// Who the fact is about
        #[arg(long, default_value = "user")]
        subject: String,
        /// Confidence in [0,1]
        #[arg(long, default_value_t = 0.95)]
        confidence: f64,
    },
    /// Ask a question against stored memory
    Recall {
        /// Natural-language question
        query: String,
        /// Session scope for caching
        #[arg(long, default_value = "default")]
        session: String,
        /// memory or hybrid
        #[arg(long, default_value = "memory")]
        mode: String,
    },
    /// Explain an observed effect via stored causal links
    Why {
        /// The effect to explain
        effect: String,
        /// Maximum chain length
        #[arg(long, default_value_t = 5)]
        max_depth: i64,
    },
    /// Soft-retract facts by id or by subject/predicate filter
    Forget {
        /// Why the fact(s) should be forgotten
        #[arg(long)]
        reason: String,
        /// Retract one fact by id
        #[arg(long)]
        fact_id: Option<String>,
        /// Retract active facts about this subject
        #[arg(long)]
        subject: Option<String>,
        /// Narrow the subject filter to one predicate
        #[arg(long)]
        predicate: Option<String>,
    },
    /// Replace a wrong belief with a corrected, user-affirmed one
    Correct {
        /// Relation to correct
        predicate: String,
        /// The wrong value currently believed
        old_value: String,
        /// The correct value
        new_value: String,
        /// Who the fact is about
        #[arg(long, default_value = "user")]
        subject: String,
        /// Why the old value was wrong
        #[arg(long, default_value = "user correction")]
        reason: String,
    },
    /// Print store statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let store = match &cli.store_path {
        Some(path) => MemoryStore::open_at(&cli.agent, path.clone()),
        None => MemoryStore::open(&cli.agent),
    }
    .context("failed to open memory store")?;
    let store = Arc::new(store);

    let result = match cli.command {
        Command::Remember {
            predicate,
            object,
            subject,
            confidence,
        } => {
            let args = serde_json::json!({
                "subject": subject,
                "predicate": predicate,
                "object": object,
                "confidence": confidence,
            });
            tools::remember::execute(&store, Some(args)).await
        }
        Command::Recall {
            query,
            session,
            mode,
        } => {
            // No provider wired at the CLI: recall degrades to listing
            // the supporting facts verbatim
            let engine = Arc::new(RecallEngine::new(store.clone(), None));
            let args = serde_json::json!({
                "query": query,
                "sessionId": session,
                "mode": mode,
            });
            tools::recall::execute(&engine, Some(args)).await
        }
        Command::Why { effect, max_depth } => {
            let args = serde_json::json!({ "effect": effect, "maxDepth": max_depth });
            tools::why::execute(&store, Some(args)).await
        }
        Command::Forget {
            reason,
            fact_id,
            subject,
            predicate,
        } => {
            let args = serde_json::json!({
                "reason": reason,
                "factId": fact_id,
                "subject": subject,
                "predicate": predicate,
            });
            tools::forget::execute(&store, Some(args)).await
        }
        Command::Correct {
            predicate,
            old_value,
            new_value,
            subject,
            reason,
        } => {
            let args = serde_json::json!({
                "subject": subject,
                "predicate": predicate,
                "oldValue": old_value,
                "newValue": new_value,
                "reason": reason,
            });
            tools::correct::execute(&store, Some(args)).await
        }
        Command::Stats => store
            .stats()
            .map(|s| serde_json::to_value(s).unwrap_or_default())
            .map_err(|e| e.to_string()),
    };

    match result {
        Ok(payload) => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        Err(message) => Err(anyhow!(message)),
    }
}
