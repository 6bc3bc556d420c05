//! Recommendation orchestrator
//!
//! Runs one invocation through analysis, recall, ranking and explanation.
//! The orchestrator itself is immutable; all per-caller state lives in the
//! [`SessionState`] lent to [`Orchestrator::forward`].

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::agents::{
    attach_descriptions, format_ranking, parse_ranking, AgentRole, AgentSet, PromptArgs,
};
use crate::errors::{RecError, Result};
use crate::observe::{LogSource, Observation, ObservationPayload, ObservationSink};
use crate::pipeline::{ChatRole, PipelineEvent, PipelineState, SessionState};
use crate::recall::CandidateRecall;
use crate::types::ProjectQuery;

/// Separator used when listing recalled names
const NAME_LIST_SEPARATOR: &str = "、";

/// Arguments of one `forward` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationRequest {
    pub project: ProjectQuery,
    /// Candidates to recall, `1 ≤ top_k ≤ index size`
    pub top_k: usize,
    /// Ranked experts to return, clamped to what the Recommender produced
    pub num: usize,
    /// Clear chat history before running
    pub reset: bool,
}

impl RecommendationRequest {
    pub fn new(project: ProjectQuery, top_k: usize, num: usize) -> Self {
        Self {
            project,
            top_k,
            num,
            reset: true,
        }
    }

    /// Carry chat history over from earlier invocations
    pub fn keep_history(mut self) -> Self {
        self.reset = false;
        self
    }

    /// Build from raw positional inputs, which must be exactly (name, description)
    pub fn from_inputs(inputs: &[String], top_k: usize, num: usize, reset: bool) -> Result<Self> {
        match inputs {
            [name, description] => Ok(Self {
                project: ProjectQuery::new(name.as_str(), description.as_str()),
                top_k,
                num,
                reset,
            }),
            _ => Err(RecError::InvalidInput(format!(
                "Project name and project information are both needed, got {} input(s)",
                inputs.len()
            ))),
        }
    }

    /// Checks run before any external call
    pub fn validate(&self, index_size: usize) -> Result<()> {
        if self.project.name.trim().is_empty() {
            return Err(RecError::InvalidInput("Project name is empty".to_string()));
        }
        if self.project.description.trim().is_empty() {
            return Err(RecError::InvalidInput(
                "Project description is empty".to_string(),
            ));
        }
        if self.top_k == 0 || self.top_k > index_size {
            return Err(RecError::InvalidInput(format!(
                "top_k must be between 1 and {}, got {}",
                index_size, self.top_k
            )));
        }
        if self.num == 0 {
            return Err(RecError::InvalidInput("num must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Sequences the agents around candidate recall
pub struct Orchestrator {
    agents: AgentSet,
    recall: CandidateRecall,
    sink: Arc<dyn ObservationSink>,
}

impl Orchestrator {
    /// Fails with `Config` unless every online role is present
    pub fn new(
        agents: AgentSet,
        recall: CandidateRecall,
        sink: Arc<dyn ObservationSink>,
    ) -> Result<Self> {
        agents.require(&AgentRole::ONLINE)?;
        Ok(Self {
            agents,
            recall,
            sink,
        })
    }

    pub fn index_size(&self) -> usize {
        self.recall.index_size()
    }

    /// Raw positional entry point: `(name, description)`
    pub async fn recommend(
        &self,
        session: &mut SessionState,
        user_input: &[String],
        top_k: usize,
        num: usize,
        reset: bool,
    ) -> Result<Vec<String>> {
        let request = RecommendationRequest::from_inputs(user_input, top_k, num, reset)
            .map_err(|e| e.in_stage(PipelineState::Idle))?;
        self.forward(session, &request).await
    }

    /// Run one invocation and return the top `num` formatted ranking lines
    ///
    /// Any failure aborts the invocation with a `Pipeline` error naming the
    /// stage; no partial ranking is returned.
    pub async fn forward(
        &self,
        session: &mut SessionState,
        request: &RecommendationRequest,
    ) -> Result<Vec<String>> {
        request
            .validate(self.index_size())
            .map_err(|e| e.in_stage(PipelineState::Idle))?;

        session.reset(request.reset);
        let history = session.formatted_history();
        session.add_turn(request.project.recall_text(), ChatRole::User);
        info!(
            turns = session.chat_history().len(),
            project = %request.project.name,
            "user turn added"
        );

        let outcome = match advance(session, PipelineEvent::Start) {
            Ok(()) => self.run(session, request, history).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(answer) => {
                session.finish(answer.clone());
                info!(returned = answer.len(), "recommendation complete");
                Ok(answer)
            }
            Err(e) => {
                let stage = session.stage;
                session.stage = PipelineState::Failed;
                warn!(stage = %stage, error = %e, "recommendation failed");
                Err(e.in_stage(stage))
            }
        }
    }

    async fn run(
        &self,
        session: &mut SessionState,
        request: &RecommendationRequest,
        history: String,
    ) -> Result<Vec<String>> {
        let project = &request.project;

        // Analysis
        let analyst_args = PromptArgs::new()
            .with("project_name", project.name.as_str())
            .with("project_infos", project.description.as_str())
            .with("history", history);
        let analysis = self
            .agents
            .get(AgentRole::ProjectAnalyst)?
            .invoke_observed(&analyst_args, self.sink.as_ref())
            .await?;
        session.scratchpad = analysis.clone();
        advance(session, PipelineEvent::AnalysisComplete)?;

        // Recall
        let candidates = self.recall.recall(&project.recall_text(), request.top_k).await?;
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        self.sink.observe(Observation::text(
            LogSource::Searcher,
            names.join(NAME_LIST_SEPARATOR),
        ));
        self.sink.observe(Observation::new(
            LogSource::Agent(AgentRole::ExpertAnalyst),
            ObservationPayload::Candidates(candidates.clone()),
        ));
        advance(session, PipelineEvent::RecallComplete)?;

        // Ranking
        let recommender_args = PromptArgs::new()
            .with("project", analysis.as_str())
            .with("experts", serde_json::to_string(&candidates)?);
        let answer = self
            .agents
            .get(AgentRole::Recommender)?
            .invoke_json(&recommender_args)
            .await?;
        let ranked = parse_ranking(&answer)?;
        let lines = format_ranking(&ranked, request.num);
        debug!(ranked = ranked.len(), returned = lines.len(), "ranking validated");
        self.sink.observe(Observation::new(
            LogSource::Agent(AgentRole::Recommender),
            ObservationPayload::Ranking(lines.clone()),
        ));
        advance(session, PipelineEvent::RankingComplete)?;

        // Explanation, observed only
        let described = attach_descriptions(&ranked, &candidates, request.num);
        let explainer_args = PromptArgs::new()
            .with("project", analysis.as_str())
            .with("experts", serde_json::to_string(&described)?);
        self.agents
            .get(AgentRole::Explainer)?
            .invoke_observed(&explainer_args, self.sink.as_ref())
            .await?;
        advance(session, PipelineEvent::ExplanationComplete)?;

        Ok(lines)
    }
}

fn advance(session: &mut SessionState, event: PipelineEvent) -> Result<()> {
    let next = session.stage.transition(event)?;
    debug!(from = %session.stage, to = %next, "pipeline transition");
    session.stage = next;
    Ok(())
}

/// Orchestrator bundled with its own session
///
/// Concurrent calls serialize on the session lock.
pub struct ExpertRecSystem {
    orchestrator: Orchestrator,
    session: Mutex<SessionState>,
}

impl ExpertRecSystem {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            session: Mutex::new(SessionState::new()),
        }
    }

    pub async fn recommend(
        &self,
        user_input: &[String],
        top_k: usize,
        num: usize,
        reset: bool,
    ) -> Result<Vec<String>> {
        let mut session = self.session.lock().await;
        self.orchestrator
            .recommend(&mut session, user_input, top_k, num, reset)
            .await
    }

    /// Copy of the current session
    pub async fn session(&self) -> SessionState {
        self.session.lock().await.clone()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, description: &str, top_k: usize, num: usize) -> RecommendationRequest {
        RecommendationRequest::new(ProjectQuery::new(name, description), top_k, num)
    }

    #[test]
    fn test_from_inputs_requires_two() {
        let one = vec!["离子膜".to_string()];
        assert!(matches!(
            RecommendationRequest::from_inputs(&one, 10, 3, true),
            Err(RecError::InvalidInput(_))
        ));

        let two = vec!["离子膜".to_string(), "采购".to_string()];
        let req = RecommendationRequest::from_inputs(&two, 10, 3, false).unwrap();
        assert_eq!(req.project.recall_text(), "离子膜:采购");
        assert!(!req.reset);
    }

    #[test]
    fn test_validate_bounds() {
        assert!(request("a", "b", 5, 1).validate(5).is_ok());
        assert!(request("a", "b", 0, 1).validate(5).is_err());
        assert!(request("a", "b", 6, 1).validate(5).is_err());
        assert!(request("a", "b", 5, 0).validate(5).is_err());
        assert!(request("  ", "b", 5, 1).validate(5).is_err());
        assert!(request("a", "", 5, 1).validate(5).is_err());
    }

    #[test]
    fn test_keep_history() {
        assert!(request("a", "b", 1, 1).reset);
        assert!(!request("a", "b", 1, 1).keep_history().reset);
    }
}
