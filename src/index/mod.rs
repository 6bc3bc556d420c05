//! Nearest-neighbour search over expert embeddings
//!
//! Positions returned by an index are row numbers into the expert table
//! the index was built with. Index and table are one versioned artifact:
//! rebuilding one invalidates the other.
//!
//! Backends:
//! - `FlatIndex`: exact inner-product scan, persisted with bincode
//! - `QdrantIndex`: remote Qdrant collection using the dot-product metric

pub mod artifact;
pub mod flat;
pub mod qdrant;

pub use artifact::{ExpertTable, IndexArtifact};
pub use flat::FlatIndex;
pub use qdrant::QdrantIndex;

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Row position with its similarity to the query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredIndex {
    pub position: usize,
    pub similarity: f32,
}

/// Read-only nearest-neighbour service
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` positions, similarity descending, ties by ascending position
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredIndex>>;

    /// Number of stored vectors
    fn len(&self) -> usize;

    /// Vector dimension
    fn dimension(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result ordering shared by all backends
pub fn ranking_order(a: &ScoredIndex, b: &ScoredIndex) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then(a.position.cmp(&b.position))
}
