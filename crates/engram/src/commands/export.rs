//! Memory export as JSON.

use anyhow::Result;
use clap::Args;

use engram_memory::MemoryFilter;
use engram_pipeline::QueryApi;

use super::Context;

#[derive(Args)]
pub struct ExportArgs {
    /// Minimum importance score
    #[arg(long, default_value_t = 0.0)]
    pub min_importance: f32,

    /// Restrict to one session
    #[arg(long)]
    pub session: Option<String>,
}

pub async fn run(args: ExportArgs, ctx: &Context) -> Result<()> {
    let api = QueryApi::new(ctx.open_store()?, ctx.embedder()?);

    let mut filter = MemoryFilter::new().with_min_importance(args.min_importance);
    if let Some(session) = args.session {
        filter = filter.with_session(session);
    }

    let memories = api.export(&filter)?;
    println!("{}", serde_json::to_string_pretty(&memories)?);
    Ok(())
}
