//! expertrec - Expert recommendation for procurement projects
//!
//! Combines dense vector recall with a staged chain of LLM agents.
//!
//! # Architecture
//!
//! - **embedding / index / recall**: text → unit vector → top-K experts
//! - **agents / llm**: prompt templates, model settings, generation backends
//! - **pipeline**: session state, stage machine, orchestrator
//! - **offline / evaluation**: index build, expert analysis, recall metrics

pub mod agents;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod evaluation;
pub mod index;
pub mod llm;
pub mod observe;
pub mod offline;
pub mod pipeline;
pub mod recall;
pub mod types;

// Re-export commonly used types
pub use errors::{ErrorKind, RecError, Result};
pub use pipeline::{ExpertRecSystem, Orchestrator, RecommendationRequest, SessionState};
