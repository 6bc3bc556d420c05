//! Error types for the expert recommendation system
//!
//! One variant per failure class of the pipeline, plus the ambient
//! transport/config failures. Errors escaping `Orchestrator::forward` are
//! always wrapped in [`RecError::Pipeline`] so callers see the stage that
//! failed alongside the original cause.

use crate::pipeline::{PipelineEvent, PipelineState};
use thiserror::Error;

/// Main error type for the recommendation system
#[derive(Error, Debug)]
pub enum RecError {
    /// Malformed caller input (arity, empty strings, out-of-range counts)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Embedding or tokenization failure
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Vector index missing, corrupt, or out of sync with the expert table
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// LLM backend failure (transport, status, empty response)
    #[error("Generation error: {0}")]
    Generation(String),

    /// Agent output failed schema validation
    #[error("Malformed agent output: {0}")]
    MalformedAgentOutput(String),

    /// Umbrella error surfaced to top-level callers
    #[error("Pipeline failed while {stage}: {source}")]
    Pipeline {
        stage: PipelineState,
        #[source]
        source: Box<RecError>,
    },

    /// Stage machine asked to take an edge it does not have
    #[error("No valid pipeline transition from {from:?} on {event:?}")]
    InvalidTransition {
        from: PipelineState,
        event: PipelineEvent,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// External call exceeded its deadline
    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable classification of [`RecError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Encoding,
    IndexUnavailable,
    Generation,
    MalformedAgentOutput,
    Pipeline,
    InvalidTransition,
    Config,
    Timeout,
    Transport,
}

/// Result type alias for recommendation operations
pub type Result<T> = std::result::Result<T, RecError>;

impl RecError {
    /// Wrap an error with the pipeline stage it escaped from.
    ///
    /// Already-wrapped errors are returned unchanged so the innermost
    /// stage is the one reported.
    pub fn in_stage(self, stage: PipelineState) -> Self {
        match self {
            RecError::Pipeline { .. } => self,
            other => RecError::Pipeline {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Classification of this error (not looking through wrappers)
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecError::InvalidInput(_) => ErrorKind::InvalidInput,
            RecError::Encoding(_) => ErrorKind::Encoding,
            RecError::IndexUnavailable(_) => ErrorKind::IndexUnavailable,
            RecError::Generation(_) => ErrorKind::Generation,
            RecError::MalformedAgentOutput(_) => ErrorKind::MalformedAgentOutput,
            RecError::Pipeline { .. } => ErrorKind::Pipeline,
            RecError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            RecError::Config(_) => ErrorKind::Config,
            RecError::Timeout { .. } => ErrorKind::Timeout,
            RecError::Http(_) | RecError::Serialization(_) | RecError::Io(_) => {
                ErrorKind::Transport
            }
        }
    }

    /// Innermost cause, looking through `Pipeline` wrappers
    pub fn root_cause(&self) -> &RecError {
        match self {
            RecError::Pipeline { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Stage the error originated in, if it has been wrapped
    pub fn stage(&self) -> Option<PipelineState> {
        match self {
            RecError::Pipeline { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
