//! Store statistics.

use anyhow::Result;
use clap::Args;

use super::Context;

#[derive(Args)]
pub struct StatsArgs {}

pub async fn run(_args: StatsArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let stats = store.stats()?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Memories:        {}", stats.total);
    println!("Sessions:        {}", stats.session_count);
    println!("Embeddings:      {}", stats.embedding_count);
    println!("Avg importance:  {:.2}", stats.avg_importance);
    println!();
    println!("By category:");
    for (category, count) in &stats.by_category {
        println!("  {category:<12} {count}");
    }
    println!("By flag:");
    for (flag, count) in &stats.by_flag {
        println!("  {flag:<18} {count}");
    }
    Ok(())
}
