//! Recommendation pipeline state machine
//!
//! Deterministic finite state machine for a single `forward` invocation:
//! - Safety: stages can only advance in data-dependency order
//! - Liveness: every invocation ends in `Done` or `Failed`
//! - Determinism: unique next state per event

use crate::errors::{RecError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline execution states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    /// No invocation in progress
    Idle,

    /// Project Analyst is summarising the project
    AnalyzingProject,

    /// Embedding the project and querying the vector index
    Recalling,

    /// Recommender is ordering the candidates
    Ranking,

    /// Explainer is justifying the top picks
    Explaining,

    /// Invocation completed (terminal)
    Done,

    /// Invocation aborted (terminal)
    Failed,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Input validated, invocation started
    Start,

    /// Project analysis text received
    AnalysisComplete,

    /// Candidate experts recalled
    RecallComplete,

    /// Ranked list validated and formatted
    RankingComplete,

    /// Explanation produced
    ExplanationComplete,

    /// Unrecoverable error in the current stage
    Fail,
}

impl PipelineState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Attempt state transition with validation
    ///
    /// Valid transitions:
    /// 1. Idle/Done/Failed → AnalyzingProject (on: Start)
    /// 2. AnalyzingProject → Recalling        (on: AnalysisComplete)
    /// 3. Recalling        → Ranking          (on: RecallComplete)
    /// 4. Ranking          → Explaining       (on: RankingComplete)
    /// 5. Explaining       → Done             (on: ExplanationComplete)
    /// 6. \*                → Failed           (on: Fail)
    pub fn transition(&self, event: PipelineEvent) -> Result<PipelineState> {
        use PipelineEvent::*;
        use PipelineState::*;

        if event == Fail {
            return Ok(Failed);
        }

        let next_state = match (self, event) {
            (Idle | Done | Failed, Start) => AnalyzingProject,
            (AnalyzingProject, AnalysisComplete) => Recalling,
            (Recalling, RecallComplete) => Ranking,
            (Ranking, RankingComplete) => Explaining,
            (Explaining, ExplanationComplete) => Done,
            (from, event) => {
                return Err(RecError::InvalidTransition { from: *from, event });
            }
        };

        Ok(next_state)
    }

    /// Human-readable stage name
    pub fn display_name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::AnalyzingProject => "analyzing project",
            PipelineState::Recalling => "recalling candidates",
            PipelineState::Ranking => "ranking experts",
            PipelineState::Explaining => "explaining recommendations",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        PipelineState::Idle
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
