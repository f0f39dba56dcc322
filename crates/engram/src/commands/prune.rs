//! Prune sweep with dry-run support.

use anyhow::Result;
use clap::Args;

use engram_pipeline::{PrunePolicy, Pruner};

use super::Context;

#[derive(Args)]
pub struct PruneArgs {
    /// Report what would be removed without deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Age threshold in days for the age rule
    #[arg(long, default_value_t = 90.0)]
    pub old_threshold_days: f64,

    /// Importance below which old memories are removed
    #[arg(long, default_value_t = 3.0)]
    pub low_importance: f32,

    /// Per-session memory cap
    #[arg(long, default_value_t = 500)]
    pub max_per_session: usize,
}

pub async fn run(args: PruneArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let cache = ctx.graph_cache();

    let policy = PrunePolicy {
        old_threshold_days: args.old_threshold_days,
        low_importance_threshold: args.low_importance,
        max_per_session: args.max_per_session,
        ..Default::default()
    };
    let report = Pruner::new(policy).sweep(&store, Some(&cache), args.dry_run)?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let verb = if report.dry_run { "Would prune" } else { "Pruned" };
    println!(
        "{verb} {} memories ({} by age, {} redundant, {} over capacity); {} remain",
        report.total_pruned,
        report.age_pruned,
        report.redundancy_pruned,
        report.capacity_pruned,
        report.remaining
    );
    Ok(())
}
