//! Embedding service
//!
//! Turns text into a unit-length vector. Pure function of the input and
//! the loaded weights; implementations must be deterministic.

pub mod engine;

pub use engine::EmbeddingEngine;

use crate::errors::{RecError, Result};

/// Default token budget before truncation
pub const DEFAULT_MAX_LENGTH: usize = 512;

/// Text → unit vector
pub trait Embedder: Send + Sync {
    /// Embed `text`; fails with `Encoding` on empty text or tokenizer failure
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Output dimension
    fn dimension(&self) -> usize;
}

/// Scale `vector` in place to unit L2 norm
pub fn l2_normalize(vector: &mut [f32]) -> Result<()> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm == 0.0 {
        return Err(RecError::Encoding(format!(
            "Cannot normalise vector with norm {}",
            norm
        )));
    }
    vector.iter_mut().for_each(|x| *x /= norm);
    Ok(())
}
