//! Prompt + model + backend unit shared by every role

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::agents::output::parse_json_object;
use crate::agents::{AgentRole, PromptArgs, PromptTemplates};
use crate::errors::{RecError, Result};
use crate::llm::{GenerationRequest, LlmBackend, ModelConfig};
use crate::observe::{LogSource, Observation, ObservationSink};

/// Default deadline for one generation call
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// A configured reasoning unit
///
/// Roles differ only in their templates and output shape. Each call is a
/// single attempt.
pub struct Agent {
    role: AgentRole,
    prompts: PromptTemplates,
    model: ModelConfig,
    backend: Arc<dyn LlmBackend>,
    timeout: Duration,
}

impl Agent {
    pub fn new(
        role: AgentRole,
        prompts: PromptTemplates,
        mut model: ModelConfig,
        backend: Arc<dyn LlmBackend>,
    ) -> Self {
        model.json_mode |= role.expects_json();
        Self {
            role,
            prompts,
            model,
            backend,
            timeout: DEFAULT_LLM_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    /// Render the prompt and generate a completion
    pub async fn invoke(&self, args: &PromptArgs) -> Result<String> {
        let prompt = self.prompts.render(args)?;
        let request = GenerationRequest::new(&self.model, prompt);
        debug!(
            role = %self.role,
            backend = self.backend.name(),
            model = %self.model.model,
            prompt_chars = request.prompt.chars().count(),
            "invoking agent"
        );

        let output = match tokio::time::timeout(self.timeout, self.backend.generate(&request)).await
        {
            Ok(result) => result.map_err(|e| match e {
                RecError::Generation(_) | RecError::Timeout { .. } => e,
                other => RecError::Generation(other.to_string()),
            })?,
            Err(_) => {
                return Err(RecError::Timeout {
                    operation: format!("{} generation", self.role),
                    duration_ms: self.timeout.as_millis() as u64,
                })
            }
        };

        if output.trim().is_empty() {
            return Err(RecError::Generation(format!(
                "{} returned an empty completion",
                self.role
            )));
        }
        Ok(output)
    }

    /// `invoke`, reporting the text to `sink`
    pub async fn invoke_observed(
        &self,
        args: &PromptArgs,
        sink: &dyn ObservationSink,
    ) -> Result<String> {
        let output = self.invoke(args).await?;
        info!(role = %self.role, "agent responded");
        sink.observe(Observation::text(LogSource::Agent(self.role), output.clone()));
        Ok(output)
    }

    /// `invoke`, then parse the JSON object in the completion
    ///
    /// Required keys are checked by the caller.
    pub async fn invoke_json(&self, args: &PromptArgs) -> Result<Value> {
        let output = self.invoke(args).await?;
        parse_json_object(&output)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("role", &self.role)
            .field("model", &self.model)
            .field("backend", &self.backend.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::RecordingSink;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EchoBackend {
        reply: String,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl EchoBackend {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for EchoBackend {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl LlmBackend for SlowBackend {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn recommender_args() -> PromptArgs {
        PromptArgs::new().with("project", "分析").with("experts", "[]")
    }

    #[tokio::test]
    async fn test_recommender_forces_json_mode() {
        let backend = EchoBackend::new(r#"{"sorted_experts": []}"#);
        let agent = Agent::new(
            AgentRole::Recommender,
            PromptTemplates::defaults(AgentRole::Recommender),
            ModelConfig::default(),
            backend.clone(),
        );

        let value = agent.invoke_json(&recommender_args()).await.unwrap();
        assert!(value["sorted_experts"].is_array());
        assert!(backend.seen.lock().unwrap()[0].json_mode);
    }

    #[tokio::test]
    async fn test_missing_argument_makes_no_call() {
        let backend = EchoBackend::new("x");
        let agent = Agent::new(
            AgentRole::Explainer,
            PromptTemplates::defaults(AgentRole::Explainer),
            ModelConfig::default(),
            backend.clone(),
        );

        let result = agent.invoke(&PromptArgs::new()).await;
        assert!(matches!(result, Err(RecError::Config(_))));
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_observed_invoke_reports_output() {
        let agent = Agent::new(
            AgentRole::Explainer,
            PromptTemplates::defaults(AgentRole::Explainer),
            ModelConfig::default(),
            EchoBackend::new("理由"),
        );
        let sink = RecordingSink::new();

        let text = agent.invoke_observed(&recommender_args(), &sink).await.unwrap();
        assert_eq!(text, "理由");
        assert_eq!(
            sink.from_source(LogSource::Agent(AgentRole::Explainer))[0].payload,
            crate::observe::ObservationPayload::Text("理由".to_string())
        );
    }

    #[tokio::test]
    async fn test_empty_completion_is_generation_error() {
        let agent = Agent::new(
            AgentRole::Explainer,
            PromptTemplates::defaults(AgentRole::Explainer),
            ModelConfig::default(),
            EchoBackend::new("   "),
        );
        let result = agent.invoke(&recommender_args()).await;
        assert!(matches!(result, Err(RecError::Generation(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let agent = Agent::new(
            AgentRole::Explainer,
            PromptTemplates::defaults(AgentRole::Explainer),
            ModelConfig::default(),
            Arc::new(SlowBackend),
        )
        .with_timeout(Duration::from_millis(50));

        let result = agent.invoke(&recommender_args()).await;
        assert!(matches!(result, Err(RecError::Timeout { .. })));
    }
}
