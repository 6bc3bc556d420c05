//! Shared mocks for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use expertrec::agents::{Agent, AgentRole, AgentSet, PromptTemplates};
use expertrec::embedding::Embedder;
use expertrec::index::{ExpertTable, FlatIndex};
use expertrec::llm::{GenerationRequest, LlmBackend, ModelConfig};
use expertrec::observe::RecordingSink;
use expertrec::pipeline::Orchestrator;
use expertrec::recall::{CandidateRecall, RecallTimeouts};
use expertrec::types::ExpertRecord;
use expertrec::{RecError, Result};

/// Looks texts up in a table, falling back to a default vector
pub struct CountingEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
    calls: AtomicUsize,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl CountingEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            vectors: HashMap::new(),
            fallback,
            calls: AtomicUsize::new(0),
            failure: None,
            delay: None,
        }
    }

    /// Every call fails with an `Encoding` error
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Every call blocks the calling thread for `delay` first
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for CountingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(message) = &self.failure {
            return Err(RecError::Encoding(message.clone()));
        }
        if text.is_empty() {
            return Err(RecError::Encoding("empty text".to_string()));
        }
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }

    fn dimension(&self) -> usize {
        self.fallback.len()
    }
}

/// Replies with a fixed completion and records every prompt
pub struct ScriptedBackend {
    reply: std::result::Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.reply.clone().map_err(RecError::Generation)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn record(id: &str, name: &str, specialist: &str, description: &str) -> ExpertRecord {
    ExpertRecord {
        expert_id: id.to_string(),
        name: name.to_string(),
        specialist: specialist.to_string(),
        description: description.to_string(),
    }
}

/// Experts A ([1, 0]) and B ([0, 1])
pub fn two_expert_recall(embedder: Arc<CountingEmbedder>) -> CandidateRecall {
    let index = FlatIndex::build(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
    let table = ExpertTable::new(
        Uuid::new_v4(),
        vec![
            record("1", "A", "X", "desc-A"),
            record("2", "B", "Y", "desc-B"),
        ],
    );
    CandidateRecall::new(embedder, Arc::new(index), Arc::new(table)).unwrap()
}

pub const TWO_EXPERT_RANKING: &str = r#"{"sorted_experts":[{"rank":1,"name":"A","specialist":"X"},{"rank":2,"name":"B","specialist":"Y"}]}"#;

/// Orchestrator over the two-expert index with scripted agents
pub struct Fixture {
    pub orchestrator: Orchestrator,
    pub embedder: Arc<CountingEmbedder>,
    pub analyst: Arc<ScriptedBackend>,
    pub recommender: Arc<ScriptedBackend>,
    pub explainer: Arc<ScriptedBackend>,
    pub sink: RecordingSink,
}

impl Fixture {
    pub fn new(recommender_reply: &str) -> Self {
        Self::with_backends(
            ScriptedBackend::replying("项目分析"),
            ScriptedBackend::replying(recommender_reply),
        )
    }

    pub fn with_backends(analyst: Arc<ScriptedBackend>, recommender: Arc<ScriptedBackend>) -> Self {
        Self::build(
            analyst,
            recommender,
            ScriptedBackend::replying("推荐理由"),
            CountingEmbedder::new(vec![1.0, 0.0]),
            RecallTimeouts::default(),
        )
    }

    pub fn with_explainer(explainer: Arc<ScriptedBackend>) -> Self {
        Self::build(
            ScriptedBackend::replying("项目分析"),
            ScriptedBackend::replying(TWO_EXPERT_RANKING),
            explainer,
            CountingEmbedder::new(vec![1.0, 0.0]),
            RecallTimeouts::default(),
        )
    }

    pub fn with_embedder(embedder: CountingEmbedder, timeouts: RecallTimeouts) -> Self {
        Self::build(
            ScriptedBackend::replying("项目分析"),
            ScriptedBackend::replying(TWO_EXPERT_RANKING),
            ScriptedBackend::replying("推荐理由"),
            embedder,
            timeouts,
        )
    }

    pub fn build(
        analyst: Arc<ScriptedBackend>,
        recommender: Arc<ScriptedBackend>,
        explainer: Arc<ScriptedBackend>,
        embedder: CountingEmbedder,
        timeouts: RecallTimeouts,
    ) -> Self {
        let embedder = Arc::new(embedder);
        let sink = RecordingSink::new();

        let agents = AgentSet::new()
            .with(agent(AgentRole::ProjectAnalyst, analyst.clone()))
            .with(agent(AgentRole::Recommender, recommender.clone()))
            .with(agent(AgentRole::Explainer, explainer.clone()));

        let orchestrator = Orchestrator::new(
            agents,
            two_expert_recall(embedder.clone()).with_timeouts(timeouts),
            Arc::new(sink.clone()),
        )
        .unwrap();

        Self {
            orchestrator,
            embedder,
            analyst,
            recommender,
            explainer,
            sink,
        }
    }

    pub fn llm_calls(&self) -> usize {
        self.analyst.calls() + self.recommender.calls() + self.explainer.calls()
    }
}

pub fn agent(role: AgentRole, backend: Arc<ScriptedBackend>) -> Agent {
    Agent::new(
        role,
        PromptTemplates::defaults(role),
        ModelConfig::default(),
        backend,
    )
}

pub fn inputs(name: &str, description: &str) -> Vec<String> {
    vec![name.to_string(), description.to_string()]
}
