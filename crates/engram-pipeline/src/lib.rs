//! Ingestion and retrieval pipelines for the engram memory system.
//!
//! Two host-triggered entry points:
//!
//! - [`PreCompactPipeline`]: runs just before the host compacts its
//!   context. Loads the transcript, chunks it into Intent/Action/Outcome
//!   triples, scores and enriches each chunk, embeds with a contextual
//!   prefix, stores everything atomically, refreshes the knowledge graph,
//!   and opportunistically prunes.
//! - [`SessionStartRetriever`]: runs when a session (re)starts. Embeds the
//!   task query, gates candidates on similarity, boosts by graph proximity
//!   to the query's entities, and returns an adaptive-sized injection block
//!   topped with the most recent memories.
//!
//! Supporting components (chunker, extractors, scorer, pruner, clusterer)
//! are public for the CLI and for tests.

pub mod api;
pub mod artifacts;
pub mod chunker;
pub mod cluster;
pub mod entities;
pub mod error;
pub mod knowledge;
pub mod precompact;
pub mod prune;
pub mod score;
pub mod session_start;
pub mod task_context;
pub mod transcript;

pub use api::QueryApi;
pub use chunker::{Chunk, Chunker, ChunkerConfig};
pub use cluster::{Cluster, ClusterConfig};
pub use error::{PipelineError, Result};
pub use precompact::{PipelineConfig, PreCompactPipeline};
pub use prune::{PrunePolicy, PruneReport, Pruner};
pub use score::{ImportanceScorer, ScorerWeights};
pub use session_start::{
    RetrievalConfig, RetrievedMemory, SessionStartRetriever, format_context,
};
pub use task_context::{TaskContextScorer, TaskScore};
pub use transcript::{MAX_TRANSCRIPT_MESSAGES, load_transcript};
