//! Engram — compaction-surviving memory for AI coding assistants.
//!
//! Main entry point for the engram CLI. The `hook` subcommands are the
//! host-facing lifecycle entry points (JSON over stdin/stdout); everything
//! else is the operator surface for inspecting and maintaining the store.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{clusters, export, hook, prune, query, stats};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Engram - persistent memory across context compaction
#[derive(Parser)]
#[command(name = "engram")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// State directory (default: ~/.engram)
    #[arg(long, global = true, env = "ENGRAM_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Lifecycle hook entry points (JSON event on stdin)
    Hook(hook::HookArgs),

    /// Search memories by topic or keywords
    Query(query::QueryArgs),

    /// Show store statistics
    Stats(stats::StatsArgs),

    /// Show topical clusters for a session
    Clusters(clusters::ClustersArgs),

    /// Export memories as JSON
    Export(export::ExportArgs),

    /// Prune aged, redundant, and excess memories
    Prune(prune::PruneArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| dirs::home_dir().map(|h| h.join(".engram")))
        .unwrap_or_else(|| PathBuf::from(".engram"));
    std::fs::create_dir_all(&data_dir)?;

    // Console logging goes to stderr: the hook protocol owns stdout.
    // The file layer is the append-only debug.log next to the store.
    let filter = if cli.verbose {
        "engram=debug,engram_pipeline=debug,engram_memory=debug,engram_embed=debug,info"
    } else {
        "engram=info,engram_pipeline=info,engram_memory=info,engram_embed=info,warn"
    };

    let file_appender = tracing_appender::rolling::never(&data_dir, "debug.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "engram=debug,engram_pipeline=debug,engram_memory=debug,engram_embed=debug,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        data_dir,
        json_output: cli.json,
    };

    match cli.command {
        Commands::Hook(args) => hook::run(args, &ctx).await,
        Commands::Query(args) => query::run(args, &ctx).await,
        Commands::Stats(args) => stats::run(args, &ctx).await,
        Commands::Clusters(args) => clusters::run(args, &ctx).await,
        Commands::Export(args) => export::run(args, &ctx).await,
        Commands::Prune(args) => prune::run(args, &ctx).await,
    }
}
