//! Lifecycle hook entry points.
//!
//! The host pipes one JSON event object to stdin and reads one JSON
//! response from stdout. Contract: malformed events exit non-zero with an
//! error response; everything past input validation degrades gracefully so
//! the host's own flow is never blocked.

use std::io::Read;

use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::warn;

use engram_pipeline::{
    PipelineConfig, PreCompactPipeline, RetrievalConfig, SessionStartRetriever,
};
use engram_types::{HookStatus, PreCompactEvent, PreCompactOutput, SessionStartEvent,
    SessionStartOutput};

use super::Context;

#[derive(Args)]
pub struct HookArgs {
    #[command(subcommand)]
    pub command: HookCommand,
}

#[derive(Subcommand)]
pub enum HookCommand {
    /// Ingest the transcript before compaction
    Precompact,
    /// Retrieve and inject memories at session start
    SessionStart,
}

pub async fn run(args: HookArgs, ctx: &Context) -> Result<()> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    match args.command {
        HookCommand::Precompact => precompact(&input, ctx).await,
        HookCommand::SessionStart => session_start(&input, ctx).await,
    }
}

async fn precompact(input: &str, ctx: &Context) -> Result<()> {
    let event: PreCompactEvent = match serde_json::from_str(input) {
        Ok(event) => event,
        Err(e) => {
            // Input-shape error: report, fail the hook, leave the store
            // untouched.
            warn!("Malformed PreCompact event: {e}");
            let output = PreCompactOutput::error(format!("malformed event: {e}"));
            println!("{}", serde_json::to_string(&output)?);
            std::process::exit(2);
        }
    };

    let output = match build_precompact(ctx) {
        Ok(pipeline) => pipeline.run(&event).await,
        Err(e) => PreCompactOutput::error(e.to_string()),
    };

    println!("{}", serde_json::to_string(&output)?);
    if output.status == HookStatus::Error {
        std::process::exit(1);
    }
    Ok(())
}

fn build_precompact(ctx: &Context) -> Result<PreCompactPipeline> {
    let store = ctx.open_store()?;
    let embedder = ctx.embedder()?;
    store.set_meta("embedding.provider", embedder.name())?;
    Ok(PreCompactPipeline::new(
        store,
        embedder,
        Some(ctx.graph_cache()),
        PipelineConfig::default(),
    ))
}

async fn session_start(input: &str, ctx: &Context) -> Result<()> {
    let event: SessionStartEvent = match serde_json::from_str(input) {
        Ok(event) => event,
        Err(e) => {
            warn!("Malformed SessionStart event: {e}");
            let output = SessionStartOutput {
                additional_context: String::new(),
                memories_injected: 0,
            };
            println!("{}", serde_json::to_string(&output)?);
            std::process::exit(2);
        }
    };

    // Retrieval failures inject nothing rather than failing the hook; the
    // assistant must start regardless.
    let output = match build_retriever(ctx) {
        Ok(retriever) => retriever.run(&event).await,
        Err(e) => {
            warn!("Retriever unavailable: {e}");
            SessionStartOutput {
                additional_context: String::new(),
                memories_injected: 0,
            }
        }
    };

    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn build_retriever(ctx: &Context) -> Result<SessionStartRetriever> {
    Ok(SessionStartRetriever::new(
        ctx.open_store()?,
        ctx.embedder()?,
        Some(ctx.graph_cache()),
        RetrievalConfig::default(),
    ))
}
