//! Integration tests for the recommendation pipeline
//!
//! Runs the full orchestrator against scripted agents and an in-memory
//! index; no model or LLM server is needed.

mod common;

use std::time::Duration;

use common::{inputs, CountingEmbedder, Fixture, ScriptedBackend, TWO_EXPERT_RANKING};
use expertrec::agents::AgentRole;
use expertrec::observe::{LogSource, ObservationPayload};
use expertrec::pipeline::{ChatRole, ExpertRecSystem, PipelineState, SessionState};
use expertrec::recall::RecallTimeouts;
use expertrec::{ErrorKind, RecError};

#[tokio::test]
async fn test_num_one_returns_first_ranked_line() {
    let fixture = Fixture::new(TWO_EXPERT_RANKING);
    let mut session = SessionState::new();

    let result = fixture
        .orchestrator
        .recommend(&mut session, &inputs("离子膜", "采购装置"), 2, 1, true)
        .await
        .unwrap();

    assert_eq!(result, vec!["排名: 1, 姓名: A, 专业: X  \n".to_string()]);
    assert_eq!(session.answer, result);
    assert!(session.finished);
    assert_eq!(session.stage, PipelineState::Done);

    // Only the first ranked expert reaches the explainer
    let explainer_prompt = &fixture.explainer.prompts()[0];
    assert!(explainer_prompt.contains("desc-A"));
    assert!(!explainer_prompt.contains("desc-B"));
}

#[tokio::test]
async fn test_num_clamped_to_ranked_count() {
    let fixture = Fixture::new(TWO_EXPERT_RANKING);
    let mut session = SessionState::new();

    let result = fixture
        .orchestrator
        .recommend(&mut session, &inputs("离子膜", "采购装置"), 2, 5, true)
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result[1], "排名: 2, 姓名: B, 专业: Y  \n");
}

#[tokio::test]
async fn test_missing_required_key_aborts_ranking() {
    for missing in ["rank", "name", "specialist"] {
        let mut second = serde_json::json!({"rank": 2, "name": "B", "specialist": "Y"});
        second.as_object_mut().unwrap().remove(missing);
        let reply = serde_json::json!({"sorted_experts": [
            {"rank": 1, "name": "A", "specialist": "X"},
            second
        ]})
        .to_string();

        let fixture = Fixture::new(&reply);
        let mut session = SessionState::new();
        let err = fixture
            .orchestrator
            .recommend(&mut session, &inputs("离子膜", "采购装置"), 2, 1, true)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Pipeline);
        assert_eq!(err.stage(), Some(PipelineState::Ranking));
        assert_eq!(err.root_cause().kind(), ErrorKind::MalformedAgentOutput);
        assert!(session.answer.is_empty());
        assert!(!session.finished);
        assert_eq!(session.stage, PipelineState::Failed);
        assert_eq!(fixture.explainer.calls(), 0);
    }
}

#[tokio::test]
async fn test_single_input_makes_no_external_calls() {
    let fixture = Fixture::new(TWO_EXPERT_RANKING);
    let mut session = SessionState::new();

    let err = fixture
        .orchestrator
        .recommend(&mut session, &["离子膜".to_string()], 2, 1, true)
        .await
        .unwrap_err();

    assert_eq!(err.root_cause().kind(), ErrorKind::InvalidInput);
    assert_eq!(fixture.embedder.calls(), 0);
    assert_eq!(fixture.llm_calls(), 0);
    assert!(session.chat_history().is_empty());
}

#[tokio::test]
async fn test_out_of_range_counts_make_no_external_calls() {
    let fixture = Fixture::new(TWO_EXPERT_RANKING);
    let mut session = SessionState::new();

    for (top_k, num) in [(0, 1), (3, 1), (2, 0)] {
        let err = fixture
            .orchestrator
            .recommend(&mut session, &inputs("离子膜", "采购装置"), top_k, num, true)
            .await
            .unwrap_err();
        assert!(matches!(err.root_cause(), RecError::InvalidInput(_)));
    }

    let err = fixture
        .orchestrator
        .recommend(&mut session, &inputs("离子膜", "   "), 2, 1, true)
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), RecError::InvalidInput(_)));

    assert_eq!(fixture.embedder.calls(), 0);
    assert_eq!(fixture.llm_calls(), 0);
}

#[tokio::test]
async fn test_reset_isolates_sessions() {
    let fixture = Fixture::new(TWO_EXPERT_RANKING);
    let mut session = SessionState::new();

    fixture
        .orchestrator
        .recommend(&mut session, &inputs("项目一", "描述一"), 2, 1, true)
        .await
        .unwrap();
    fixture
        .orchestrator
        .recommend(&mut session, &inputs("项目二", "描述二"), 2, 1, true)
        .await
        .unwrap();

    assert_eq!(session.chat_history().len(), 1);
    assert_eq!(session.chat_history()[0].content, "项目二:描述二");

    let prompts = fixture.analyst.prompts();
    assert!(prompts[1].contains("No chat history."));
    assert!(!prompts[1].contains("项目一"));
}

#[tokio::test]
async fn test_keep_history_appends_in_order() {
    let fixture = Fixture::new(TWO_EXPERT_RANKING);
    let mut session = SessionState::new();

    fixture
        .orchestrator
        .recommend(&mut session, &inputs("项目一", "描述一"), 2, 1, true)
        .await
        .unwrap();
    fixture
        .orchestrator
        .recommend(&mut session, &inputs("项目二", "描述二"), 2, 1, false)
        .await
        .unwrap();

    let history = session.chat_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "项目一:描述一");
    assert_eq!(history[1].content, "项目二:描述二");
    assert!(history.iter().all(|turn| turn.role == ChatRole::User));

    // The second analysis sees the first turn as history
    assert!(fixture.analyst.prompts()[1].contains("User: 项目一:描述一"));
}

#[tokio::test]
async fn test_analysis_failure_stops_before_recall() {
    let fixture = Fixture::with_backends(
        ScriptedBackend::failing("quota exceeded"),
        ScriptedBackend::replying(TWO_EXPERT_RANKING),
    );
    let mut session = SessionState::new();

    let err = fixture
        .orchestrator
        .recommend(&mut session, &inputs("离子膜", "采购装置"), 2, 1, true)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(PipelineState::AnalyzingProject));
    assert_eq!(err.root_cause().kind(), ErrorKind::Generation);
    assert!(err.to_string().contains("quota exceeded"));
    assert_eq!(fixture.embedder.calls(), 0);
    assert_eq!(fixture.recommender.calls(), 0);
}

#[tokio::test]
async fn test_recall_failure_aborts_without_answer() {
    let fixture = Fixture::with_embedder(
        CountingEmbedder::new(vec![1.0, 0.0]).failing("tokenizer missing"),
        RecallTimeouts::default(),
    );
    let mut session = SessionState::new();

    let err = fixture
        .orchestrator
        .recommend(&mut session, &inputs("离子膜", "采购装置"), 2, 1, true)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(PipelineState::Recalling));
    assert_eq!(err.root_cause().kind(), ErrorKind::Encoding);
    assert!(session.answer.is_empty());
    assert!(!session.finished);
    assert_eq!(session.stage, PipelineState::Failed);
    assert_eq!(fixture.analyst.calls(), 1);
    assert_eq!(fixture.recommender.calls(), 0);
    assert_eq!(fixture.explainer.calls(), 0);
}

#[tokio::test]
async fn test_recall_timeout_aborts_without_answer() {
    let fixture = Fixture::with_embedder(
        CountingEmbedder::new(vec![1.0, 0.0]).slow(Duration::from_millis(300)),
        RecallTimeouts {
            embedding: Duration::from_millis(20),
            index: Duration::from_secs(10),
        },
    );
    let mut session = SessionState::new();

    let err = fixture
        .orchestrator
        .recommend(&mut session, &inputs("离子膜", "采购装置"), 2, 1, true)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(PipelineState::Recalling));
    assert_eq!(err.root_cause().kind(), ErrorKind::Timeout);
    assert!(session.answer.is_empty());
    assert!(!session.finished);
    assert_eq!(fixture.recommender.calls(), 0);
}

#[tokio::test]
async fn test_explainer_failure_discards_ranking() {
    let fixture = Fixture::with_explainer(ScriptedBackend::failing("connection reset"));
    let mut session = SessionState::new();

    let err = fixture
        .orchestrator
        .recommend(&mut session, &inputs("离子膜", "采购装置"), 2, 2, true)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(PipelineState::Explaining));
    assert_eq!(err.root_cause().kind(), ErrorKind::Generation);
    assert!(session.answer.is_empty());
    assert!(!session.finished);
    assert_eq!(session.stage, PipelineState::Failed);
    assert_eq!(fixture.recommender.calls(), 1);
    assert_eq!(fixture.explainer.calls(), 1);
}

#[tokio::test]
async fn test_fenced_recommender_output_parses() {
    let reply = format!("以下是排序结果：\n```json\n{}\n```", TWO_EXPERT_RANKING);
    let fixture = Fixture::new(&reply);
    let mut session = SessionState::new();

    let result = fixture
        .orchestrator
        .recommend(&mut session, &inputs("离子膜", "采购装置"), 2, 2, true)
        .await
        .unwrap();
    assert_eq!(result.len(), 2);
}

#[tokio::test]
async fn test_observations_follow_stage_order() {
    let fixture = Fixture::new(TWO_EXPERT_RANKING);
    let mut session = SessionState::new();

    fixture
        .orchestrator
        .recommend(&mut session, &inputs("离子膜", "采购装置"), 2, 1, true)
        .await
        .unwrap();

    let entries = fixture.sink.entries();
    let sources: Vec<LogSource> = entries.iter().map(|o| o.source).collect();
    assert_eq!(
        sources,
        vec![
            LogSource::Agent(AgentRole::ProjectAnalyst),
            LogSource::Searcher,
            LogSource::Agent(AgentRole::ExpertAnalyst),
            LogSource::Agent(AgentRole::Recommender),
            LogSource::Agent(AgentRole::Explainer),
        ]
    );

    assert_eq!(entries[1].payload, ObservationPayload::Text("A、B".to_string()));
    match &entries[2].payload {
        ObservationPayload::Candidates(candidates) => {
            assert_eq!(candidates.len(), 2);
            assert_eq!(candidates[0].expert_id, "1");
        }
        other => panic!("expected candidates, got {:?}", other),
    }
    assert_eq!(
        entries[3].payload,
        ObservationPayload::Ranking(vec!["排名: 1, 姓名: A, 专业: X  \n".to_string()])
    );
    assert_eq!(
        entries[4].payload,
        ObservationPayload::Text("推荐理由".to_string())
    );
}

#[tokio::test]
async fn test_explanation_does_not_change_result() {
    let fixture = Fixture::new(TWO_EXPERT_RANKING);
    let mut session = SessionState::new();

    let result = fixture
        .orchestrator
        .recommend(&mut session, &inputs("离子膜", "采购装置"), 2, 2, true)
        .await
        .unwrap();

    assert_eq!(fixture.explainer.calls(), 1);
    assert!(result.iter().all(|line| !line.contains("推荐理由")));
}

#[tokio::test]
async fn test_system_serializes_concurrent_calls() {
    let fixture = Fixture::new(TWO_EXPERT_RANKING);
    let system = ExpertRecSystem::new(fixture.orchestrator);

    let first = inputs("项目一", "描述一");
    let second = inputs("项目二", "描述二");
    let (a, b) = tokio::join!(
        system.recommend(&first, 2, 1, false),
        system.recommend(&second, 2, 1, false),
    );
    assert!(a.is_ok());
    assert!(b.is_ok());

    let session = system.session().await;
    assert_eq!(session.chat_history().len(), 2);
    assert_eq!(fixture.analyst.calls(), 2);
}
