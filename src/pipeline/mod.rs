//! Recommendation pipeline: state machine, session, orchestrator

pub mod orchestrator;
pub mod session;
pub mod state;

pub use orchestrator::{ExpertRecSystem, Orchestrator, RecommendationRequest};
pub use session::{ChatRole, ChatTurn, SessionState};
pub use state::{PipelineEvent, PipelineState};
