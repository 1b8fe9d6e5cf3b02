//! Sheep Server - per-agent cognitive memory over HTTP
//!
//! One process hosts one agent's memory store, the consolidation
//! scheduler, and the recall engine. The agent is selected by
//! `SHEEP_AGENT_ID` (falling back to `AGENT_ID`), the store lives under
//! `$HOME/.clawdbot/sheep/`, and the port comes from `PORT` or `--port`.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sheep_core::{
    ConsolidationPipeline, MemoryStore, PipelineConfig, RecallEngine, SchedulerConfig,
    SleepScheduler,
};
use sheep_server::state::{AppState, BufferedRunner, SessionBuffers};

#[derive(Debug, Parser)]
#[command(name = "sheep-server", version, about = "Cognitive memory HTTP service")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3096)]
    port: u16,

    /// Custom store file (defaults to ~/.clawdbot/sheep/<agent>.sqlite)
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// 5-field cron expression for nightly consolidation, e.g. "30 3 * * *"
    #[arg(long, env = "SHEEP_CONSOLIDATION_CRON")]
    cron: Option<String>,

    /// Minimum minutes between consolidations per agent
    #[arg(long, env = "SHEEP_MIN_INTERVAL_MINUTES", default_value_t = 60)]
    min_interval_minutes: u64,

    /// Minutes of silence before an agent counts as idle
    #[arg(long, env = "SHEEP_IDLE_THRESHOLD_MINUTES", default_value_t = 30)]
    idle_threshold_minutes: u64,
}

fn agent_id() -> String {
    std::env::var("SHEEP_AGENT_ID")
        .or_else(|_| std::env::var("AGENT_ID"))
        .unwrap_or_else(|_| "default".to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays clean for tooling
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let agent = agent_id();
    info!(agent = %agent, "sheep-server v{} starting", sheep_core::VERSION);

    let store = match &args.store_path {
        Some(path) => MemoryStore::open_at(&agent, path.clone()),
        None => MemoryStore::open(&agent),
    }
    .context("failed to open memory store")?;
    let store = Arc::new(store);

    // The concrete completion provider is a collaborator; without one the
    // pipeline runs pattern-only and recall degrades gracefully.
    let model: Option<sheep_core::ModelHandle> = None;
    if model.is_none() {
        warn!("no language model configured; running in pattern-only mode");
    }

    let pipeline = Arc::new(ConsolidationPipeline::new(
        store.clone(),
        model.clone(),
        PipelineConfig::default(),
    ));
    let buffers = Arc::new(SessionBuffers::default());
    let runner = Arc::new(BufferedRunner::new(pipeline, buffers.clone()));

    let scheduler = SleepScheduler::new(
        runner.clone(),
        SchedulerConfig {
            idle_threshold_ms: args.idle_threshold_minutes as i64 * 60 * 1000,
            min_interval_ms: args.min_interval_minutes as i64 * 60 * 1000,
            cron: args.cron.clone(),
            ..Default::default()
        },
    )
    .context("invalid scheduler configuration")?;
    scheduler.record_activity(&agent);
    let timer_handles = scheduler.spawn_timers();
    info!(
        cron = args.cron.as_deref().unwrap_or("(none)"),
        "sleep scheduler running"
    );

    let engine = Arc::new(
        RecallEngine::new(store.clone(), model.clone()).with_scheduler(scheduler.clone()),
    );

    let state = AppState {
        agent_id: agent.clone(),
        store,
        engine,
        scheduler,
        runner,
        buffers,
        llm_configured: model.is_some(),
    };

    let app = sheep_server::build_router(state);
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    for handle in timer_handles {
        handle.abort();
    }
    info!("sheep-server shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for shutdown signal");
    }
}
