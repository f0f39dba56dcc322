//! Memory search: semantic topic search and keyword search.

use anyhow::Result;
use clap::Args;

use engram_pipeline::QueryApi;

use super::{Context, format_memory_line};

#[derive(Args)]
pub struct QueryArgs {
    /// Topic for semantic search
    pub topic: Option<String>,

    /// Keyword search instead of semantic search (any keyword matches)
    #[arg(long, num_args = 1.., conflicts_with = "topic")]
    pub keywords: Vec<String>,

    /// Maximum results
    #[arg(short = 'k', long, default_value_t = 10)]
    pub limit: usize,

    /// Minimum importance score
    #[arg(long, default_value_t = 0.0)]
    pub min_importance: f32,

    /// Restrict to one session
    #[arg(long)]
    pub session: Option<String>,
}

pub async fn run(args: QueryArgs, ctx: &Context) -> Result<()> {
    let api = QueryApi::new(ctx.open_store()?, ctx.embedder()?);

    if !args.keywords.is_empty() {
        let results = api.keyword_search(
            &args.keywords,
            args.limit,
            args.min_importance,
            args.session.as_deref(),
        )?;
        if ctx.json_output {
            println!("{}", serde_json::to_string_pretty(&results)?);
        } else if results.is_empty() {
            println!("No memories match those keywords.");
        } else {
            for memory in &results {
                println!("{}", format_memory_line(memory));
            }
        }
        return Ok(());
    }

    let Some(topic) = args.topic else {
        anyhow::bail!("provide a topic or --keywords");
    };

    let results = api
        .search(
            &topic,
            args.limit,
            args.min_importance,
            args.session.as_deref(),
        )
        .await?;

    if ctx.json_output {
        let rows: Vec<serde_json::Value> = results
            .iter()
            .map(|m| {
                serde_json::json!({
                    "similarity": m.similarity,
                    "memory": m.memory,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if results.is_empty() {
        println!("No memories found.");
    } else {
        for result in &results {
            println!(
                "{:>4.0}%  {}",
                result.similarity * 100.0,
                format_memory_line(&result.memory)
            );
        }
    }
    Ok(())
}
