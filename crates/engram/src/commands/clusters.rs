//! Topical cluster summaries for a session.

use anyhow::Result;
use clap::Args;

use engram_pipeline::QueryApi;

use super::Context;

#[derive(Args)]
pub struct ClustersArgs {
    /// Session to cluster
    pub session: String,
}

pub async fn run(args: ClustersArgs, ctx: &Context) -> Result<()> {
    let api = QueryApi::new(ctx.open_store()?, ctx.embedder()?);
    let clusters = api.clusters(&args.session)?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&clusters)?);
        return Ok(());
    }

    if clusters.is_empty() {
        println!("No memories in session {}.", args.session);
        return Ok(());
    }

    for cluster in &clusters {
        println!(
            "Cluster {} ({} memories): {}",
            cluster.label,
            cluster.memory_ids.len(),
            cluster.summary
        );
    }
    Ok(())
}
