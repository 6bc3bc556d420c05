//! Candidate recall
//!
//! Embeds the project text and pulls the top-K experts out of the vector
//! index. Both collaborators are shared read-only resources; the embedding
//! forward pass runs on the blocking pool.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::embedding::Embedder;
use crate::errors::{RecError, Result};
use crate::index::{ExpertTable, ScoredIndex, VectorIndex};
use crate::types::CandidateExpert;

/// Deadlines for the two external calls of a recall
#[derive(Debug, Clone, Copy)]
pub struct RecallTimeouts {
    pub embedding: Duration,
    pub index: Duration,
}

impl Default for RecallTimeouts {
    fn default() -> Self {
        Self {
            embedding: Duration::from_secs(30),
            index: Duration::from_secs(10),
        }
    }
}

/// Embedder + index + expert table, checked for consistency at construction
pub struct CandidateRecall {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    experts: Arc<ExpertTable>,
    timeouts: RecallTimeouts,
}

impl CandidateRecall {
    /// Fails fast with `IndexUnavailable` when the parts do not line up
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        experts: Arc<ExpertTable>,
    ) -> Result<Self> {
        if index.is_empty() {
            return Err(RecError::IndexUnavailable("Vector index is empty".to_string()));
        }
        if index.len() != experts.len() {
            return Err(RecError::IndexUnavailable(format!(
                "Index holds {} vectors but expert table holds {} rows",
                index.len(),
                experts.len()
            )));
        }
        if embedder.dimension() != index.dimension() {
            return Err(RecError::IndexUnavailable(format!(
                "Embedding dimension {} does not match index dimension {}",
                embedder.dimension(),
                index.dimension()
            )));
        }

        Ok(Self {
            embedder,
            index,
            experts,
            timeouts: RecallTimeouts::default(),
        })
    }

    pub fn with_timeouts(mut self, timeouts: RecallTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Number of experts that can be recalled
    pub fn index_size(&self) -> usize {
        self.index.len()
    }

    /// Embed `text` off the async executor
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let text = text.to_string();
        let task = tokio::task::spawn_blocking(move || embedder.embed(&text));

        match tokio::time::timeout(self.timeouts.embedding, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(RecError::Encoding(format!(
                "Embedding task failed: {}",
                join_err
            ))),
            Err(_) => Err(RecError::Timeout {
                operation: "Embedding".to_string(),
                duration_ms: self.timeouts.embedding.as_millis() as u64,
            }),
        }
    }

    /// Top-`top_k` positions for a query vector
    pub async fn recall_vector(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredIndex>> {
        match tokio::time::timeout(self.timeouts.index, self.index.search(query, top_k)).await {
            Ok(result) => result,
            Err(_) => Err(RecError::Timeout {
                operation: "Index query".to_string(),
                duration_ms: self.timeouts.index.as_millis() as u64,
            }),
        }
    }

    /// Embed `text` and return the top-`top_k` candidate experts
    pub async fn recall(&self, text: &str, top_k: usize) -> Result<Vec<CandidateExpert>> {
        let query = self.embed(text).await?;
        let hits = self.recall_vector(&query, top_k).await?;

        let candidates = hits
            .iter()
            .map(|hit| {
                self.experts
                    .get(hit.position)
                    .map(|record| CandidateExpert::from_record(record, hit.similarity))
                    .ok_or_else(|| {
                        RecError::IndexUnavailable(format!(
                            "Index returned position {} outside the expert table",
                            hit.position
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(requested = top_k, returned = candidates.len(), "recall complete");
        Ok(candidates)
    }
}
