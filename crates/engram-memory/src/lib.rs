//! Persistent memory storage for the engram pipeline.
//!
//! This crate provides the two durable halves of the system:
//!
//! - [`MemoryStore`]: a SQLite-backed vector+metadata store. Memory rows
//!   live in an ordinary table; their embeddings live in a sqlite-vec
//!   virtual table with cosine distance. Single writer, multiple readers,
//!   one process.
//! - [`KnowledgeGraph`]: an entity co-mention graph with PageRank,
//!   betweenness, and degree centrality, plus k-hop traversal. The graph is
//!   derived from the memories; [`GraphCache`] persists it as a TTL'd
//!   snapshot under `memory_db/kg_cache/`.
//!
//! # Usage
//!
//! ```no_run
//! use engram_memory::{MemoryStore, MemoryFilter};
//!
//! let store = MemoryStore::open("/home/user/.engram/memory_db", 384)?;
//! let query_embedding = vec![0.0f32; 384];
//! let filter = MemoryFilter::new().with_min_importance(5.0);
//! let matches = store.query(&query_embedding, 20, Some(&filter))?;
//! # Ok::<(), engram_memory::MemoryError>(())
//! ```

pub mod error;
pub mod graph;
pub mod graph_cache;
pub mod store;
pub mod vector;

pub use error::{MemoryError, Result};
pub use graph::{entity_key, GraphNode, GraphStats, KnowledgeGraph};
pub use graph_cache::{DEFAULT_GRAPH_TTL, GraphCache};
pub use store::{MemoryFilter, MemoryStore, QueryMatch, StoreStats};
pub use vector::SimilarityHit;
