//! Exact inner-product index
//!
//! Brute-force scan over a contiguous row-major matrix. With unit vectors
//! the inner product is the cosine similarity. A scan over 10^5 vectors of
//! dimension 1024 stays well under a second on one core.

use async_trait::async_trait;

use crate::errors::{RecError, Result};
use crate::index::{ranking_order, ScoredIndex, VectorIndex};

/// In-memory flat index keyed by insertion order
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Build from vectors; row `i` of the input becomes position `i`
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self> {
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        if dimension == 0 {
            return Err(RecError::IndexUnavailable(
                "Cannot build an index from zero vectors".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(vectors.len() * dimension);
        for (row, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(RecError::IndexUnavailable(format!(
                    "Row {} has dimension {}, expected {}",
                    row,
                    vector.len(),
                    dimension
                )));
            }
            data.extend_from_slice(vector);
        }

        Ok(Self { dimension, data })
    }

    /// Synchronous search used by the async trait method
    pub fn search_sync(&self, query: &[f32], k: usize) -> Result<Vec<ScoredIndex>> {
        if query.len() != self.dimension {
            return Err(RecError::InvalidInput(format!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<ScoredIndex> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| ScoredIndex {
                position,
                similarity: row.iter().zip(query).map(|(a, b)| a * b).sum(),
            })
            .collect();

        let k = k.min(scored.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, ranking_order);
            scored.truncate(k);
        }
        scored.sort_by(ranking_order);

        Ok(scored)
    }

    /// Stored rows, in position order
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension)
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredIndex>> {
        self.search_sync(query, k)
    }

    fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
