//! specrag-query - Hybrid retrieval over indexed OpenAPI fragments
//!
//! This crate merges keyword (full-text match) and vector similarity results
//! into a single ranked list and augments it with parent fragments.
//!
//! # Features
//!
//! - Weighted hybrid fusion: `alpha * keyword_score + (1 - alpha) / (rank + 1)`
//! - Deterministic tie-break on fragment identifier
//! - Parent expansion from `parent_id` metadata
//! - Degrade-to-empty on source failures
//!
//! # Example
//!
//! ```rust,ignore
//! use specrag_query::{HybridRanker, ParentExpander, RankerConfig, Retriever};
//! use std::sync::Arc;
//!
//! let config = RankerConfig::new("vectors_paths", 0.5)?;
//! let ranker = HybridRanker::new(store.clone(), vectors, config);
//! let expander = ParentExpander::new(store, "vectors_paths");
//! let retriever = Retriever::new(ranker, Some(expander), 15);
//! let fragments = retriever.get_relevant_documents("how do I list pets").await;
//! ```

mod expand;
mod fusion;
mod ranker;
mod retriever;
mod vector;

pub use expand::ParentExpander;
pub use fusion::hybrid_fusion;
pub use ranker::{HybridRanker, RankerConfig};
pub use retriever::Retriever;
pub use vector::EmbeddingVectorSource;

// Re-export for convenience
pub use specrag_core::{Fragment, ScoredFragment};
