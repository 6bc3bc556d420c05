//! Type definitions module
//!
//! Records exchanged between recall, the agents, and callers.

pub mod expert;

// Re-export commonly used types
pub use expert::{
    CandidateExpert, ExpertRecord, ProjectQuery, RankedExpert, RECALL_TEXT_SEPARATOR,
};
