//! Builds the agent set from configuration

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::agents::{Agent, AgentRole};
use crate::config::SystemConfig;
use crate::errors::{RecError, Result};
use crate::llm::{self, LlmBackend, Provider};

/// Agents keyed by role
#[derive(Debug, Default)]
pub struct AgentSet {
    agents: BTreeMap<AgentRole, Agent>,
}

impl AgentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the agent for its role
    pub fn insert(&mut self, agent: Agent) {
        self.agents.insert(agent.role(), agent);
    }

    pub fn with(mut self, agent: Agent) -> Self {
        self.insert(agent);
        self
    }

    pub fn get(&self, role: AgentRole) -> Result<&Agent> {
        self.agents
            .get(&role)
            .ok_or_else(|| RecError::Config(format!("Agent {} is not configured", role)))
    }

    pub fn contains(&self, role: AgentRole) -> bool {
        self.agents.contains_key(&role)
    }

    pub fn roles(&self) -> impl Iterator<Item = AgentRole> + '_ {
        self.agents.keys().copied()
    }

    /// Fail unless every role in `roles` is present
    pub fn require(&self, roles: &[AgentRole]) -> Result<()> {
        roles.iter().try_for_each(|role| self.get(*role).map(|_| ()))
    }
}

/// Constructs agents and their backends from a [`SystemConfig`]
pub struct AgentFactory<'a> {
    config: &'a SystemConfig,
    backends: BTreeMap<ProviderKey, Arc<dyn LlmBackend>>,
}

type ProviderKey = &'static str;

fn provider_key(provider: Provider) -> ProviderKey {
    match provider {
        Provider::Ollama => "ollama",
        Provider::OpenAi => "openai",
    }
}

impl<'a> AgentFactory<'a> {
    pub fn new(config: &'a SystemConfig) -> Self {
        Self {
            config,
            backends: BTreeMap::new(),
        }
    }

    /// Use `backend` for every agent on `provider` instead of connecting
    pub fn with_backend(mut self, provider: Provider, backend: Arc<dyn LlmBackend>) -> Self {
        self.backends.insert(provider_key(provider), backend);
        self
    }

    fn backend(&mut self, provider: Provider) -> Result<Arc<dyn LlmBackend>> {
        let key = provider_key(provider);
        if let Some(backend) = self.backends.get(key) {
            return Ok(Arc::clone(backend));
        }

        let llm_settings = &self.config.llm;
        let base_url = (llm_settings.provider == provider)
            .then(|| llm_settings.base_url.as_deref())
            .flatten();
        let backend = llm::connect(
            provider,
            base_url,
            llm_settings.api_key(),
            self.config.timeouts.llm(),
        )?;
        self.backends.insert(key, Arc::clone(&backend));
        Ok(backend)
    }

    pub fn build(&mut self, role: AgentRole) -> Result<Agent> {
        let settings = self
            .config
            .roles()?
            .into_iter()
            .find(|(r, _)| *r == role)
            .map(|(_, settings)| settings.clone())
            .ok_or_else(|| RecError::Config(format!("Agent {} is not configured", role)))?;

        let provider = settings.provider.unwrap_or(self.config.llm.provider);
        let backend = self.backend(provider)?;

        Ok(Agent::new(
            role,
            settings.templates(role)?,
            settings.model_config(&self.config.llm),
            backend,
        )
        .with_timeout(self.config.timeouts.llm()))
    }

    /// Build every configured agent and check `required` are among them
    pub fn build_all(&mut self, required: &[AgentRole]) -> Result<AgentSet> {
        let mut set = AgentSet::new();
        let roles: Vec<AgentRole> = self.config.roles()?.into_iter().map(|(r, _)| r).collect();
        for role in roles {
            set.insert(self.build(role)?);
        }
        set.require(required)?;

        info!(
            agents = ?set.roles().map(|r| r.as_str()).collect::<Vec<_>>(),
            "agents ready"
        );
        Ok(set)
    }
}
