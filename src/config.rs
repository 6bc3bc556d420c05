//! Configuration for the recommendation system
//!
//! Two TOML files: the system config (agents, LLM backend, timeouts,
//! pipeline defaults) and the recall config it points at (index, expert
//! table, embedding model). Relative paths resolve against the directory
//! of the file that names them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agents::{AgentRole, PromptTemplates};
use crate::embedding::DEFAULT_MAX_LENGTH;
use crate::errors::{RecError, Result};
use crate::llm::{ModelConfig, Provider, DEFAULT_MODEL};

/// Default location of the system config
pub const DEFAULT_CONFIG_PATH: &str = "config/system.toml";

/// Top-level system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Role name → settings
    #[serde(default)]
    pub agents: BTreeMap<String, AgentSettings>,
    /// Path to the recall config
    pub recall_config: PathBuf,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub pipeline: PipelineDefaults,
}

/// Per-agent prompt and model settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSettings {
    /// JSON file of slot → template, layered over the built-in defaults
    #[serde(default)]
    pub prompt_config: Option<PathBuf>,
    /// Inline slot overrides, applied last
    #[serde(default)]
    pub prompts: BTreeMap<String, String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub json_mode: bool,
    /// Overrides `[llm].provider` for this agent
    #[serde(default)]
    pub provider: Option<Provider>,
}

/// LLM backend defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub provider: Provider,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_model")]
    pub default_model: String,
}

/// Deadlines for external calls, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub embedding_secs: u64,
    pub index_secs: u64,
    pub llm_secs: u64,
}

/// CLI defaults for a recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefaults {
    pub top_k: usize,
    pub num: usize,
}

/// Where the vectors live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Flat,
    Qdrant,
}

/// Recall resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Index artifact (bincode)
    pub index_path: PathBuf,
    /// Expert table (JSON) in index row order
    pub description_path: PathBuf,
    /// Local model directory or Hugging Face repo id
    pub emb_model_path: String,
    #[serde(default)]
    pub backend: IndexBackend,
    #[serde(default)]
    pub qdrant_url: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            base_url: None,
            api_key_env: None,
            default_model: default_model(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            embedding_secs: 30,
            index_secs: 10,
            llm_secs: 120,
        }
    }
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self { top_k: 10, num: 3 }
    }
}

impl TimeoutConfig {
    pub fn embedding(&self) -> Duration {
        Duration::from_secs(self.embedding_secs)
    }

    pub fn index(&self) -> Duration {
        Duration::from_secs(self.index_secs)
    }

    pub fn llm(&self) -> Duration {
        Duration::from_secs(self.llm_secs)
    }
}

impl LlmSettings {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }
}

impl AgentSettings {
    /// Built-in templates overlaid with the prompt file and inline slots
    pub fn templates(&self, role: AgentRole) -> Result<PromptTemplates> {
        let mut templates = PromptTemplates::defaults(role);
        if let Some(path) = &self.prompt_config {
            templates = templates.merged(PromptTemplates::from_file(path)?);
        }
        if !self.prompts.is_empty() {
            templates = templates.merged(PromptTemplates::new(self.prompts.clone()));
        }
        Ok(templates)
    }

    pub fn model_config(&self, llm: &LlmSettings) -> ModelConfig {
        ModelConfig {
            model: self
                .model
                .clone()
                .unwrap_or_else(|| llm.default_model.clone()),
            temperature: self.temperature.or(Some(0.0)),
            max_tokens: self.max_tokens,
            json_mode: self.json_mode,
        }
    }
}

impl SystemConfig {
    /// Load, resolve paths, and validate
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RecError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let mut config: SystemConfig = toml::from_str(&contents)
            .map_err(|e| RecError::Config(format!("Failed to parse config: {}", e)))?;

        let base = base_dir(path);
        config.recall_config = resolve_path(&base, &config.recall_config);
        for settings in config.agents.values_mut() {
            if let Some(prompt_config) = &settings.prompt_config {
                settings.prompt_config = Some(resolve_path(&base, prompt_config));
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let roles = self.roles()?;

        for required in AgentRole::ONLINE {
            if !roles.iter().any(|(role, _)| *role == required) {
                return Err(RecError::Config(format!(
                    "Agent {} must be configured",
                    required
                )));
            }
        }

        for (role, settings) in &roles {
            if let Some(temperature) = settings.temperature {
                if !(0.0..=2.0).contains(&temperature) {
                    return Err(RecError::Config(format!(
                        "Agent {} temperature must be between 0.0 and 2.0",
                        role
                    )));
                }
            }
        }

        if self.timeouts.embedding_secs == 0
            || self.timeouts.index_secs == 0
            || self.timeouts.llm_secs == 0
        {
            return Err(RecError::Config(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.top_k == 0 || self.pipeline.num == 0 {
            return Err(RecError::Config(
                "pipeline.top_k and pipeline.num must be at least 1".to_string(),
            ));
        }

        let uses_openai = self.llm.provider == Provider::OpenAi
            || roles
                .iter()
                .any(|(_, s)| s.provider == Some(Provider::OpenAi));
        if uses_openai && self.llm.api_key_env.is_none() {
            return Err(RecError::Config(
                "llm.api_key_env is required for the openai provider".to_string(),
            ));
        }

        Ok(())
    }

    /// Configured agents keyed by role; unknown names are rejected
    pub fn roles(&self) -> Result<Vec<(AgentRole, &AgentSettings)>> {
        self.agents
            .iter()
            .map(|(name, settings)| Ok((name.parse::<AgentRole>()?, settings)))
            .collect()
    }

    pub fn recall(&self) -> Result<RecallConfig> {
        RecallConfig::load(&self.recall_config)
    }
}

impl RecallConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RecError::Config(format!(
                "Failed to read recall config {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut config: RecallConfig = toml::from_str(&contents)
            .map_err(|e| RecError::Config(format!("Failed to parse recall config: {}", e)))?;

        let base = base_dir(path);
        config.index_path = resolve_path(&base, &config.index_path);
        config.description_path = resolve_path(&base, &config.description_path);
        config.emb_model_path = resolve_model_path(&base, &config.emb_model_path);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.emb_model_path.trim().is_empty() {
            return Err(RecError::Config("emb_model_path must not be empty".to_string()));
        }
        if self.max_length == 0 {
            return Err(RecError::Config("max_length must be greater than 0".to_string()));
        }
        if self.backend == IndexBackend::Qdrant
            && (self.qdrant_url.is_none() || self.collection.is_none())
        {
            return Err(RecError::Config(
                "qdrant backend requires qdrant_url and collection".to_string(),
            ));
        }
        Ok(())
    }
}

fn base_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Expand `~/` and anchor relative paths at `base`
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Like `resolve_path`, but leaves hub repo ids (`org/name`) untouched
fn resolve_model_path(base: &Path, raw: &str) -> String {
    let path = Path::new(raw);
    let explicit = raw.starts_with('.') || raw.starts_with('~') || path.is_absolute();
    let resolved = resolve_path(base, path);
    if explicit || resolved.exists() {
        resolved.to_string_lossy().into_owned()
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SYSTEM: &str = r#"
recall_config = "recall.toml"

[agents.ProjectAnalyst]
[agents.Recommender]
model = "qwen2.5:14b-instruct"
json_mode = true
[agents.Explainer]
prompt_config = "prompts/explainer.json"

[pipeline]
top_k = 20
num = 5
"#;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "system.toml", SYSTEM);

        let config = SystemConfig::load(&path).unwrap();
        assert_eq!(config.recall_config, dir.path().join("recall.toml"));
        assert_eq!(
            config.agents["Explainer"].prompt_config,
            Some(dir.path().join("prompts/explainer.json"))
        );
        assert_eq!(config.pipeline.top_k, 20);
        assert_eq!(config.timeouts.llm_secs, 120);
    }

    #[test]
    fn test_unknown_role_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "system.toml",
            &format!("{}\n[agents.Summarizer]\n", SYSTEM),
        );
        let err = SystemConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Summarizer"));
    }

    #[test]
    fn test_missing_online_role_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "system.toml",
            "recall_config = \"r.toml\"\n[agents.ProjectAnalyst]\n[agents.Recommender]\n",
        );
        let err = SystemConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Explainer"));
    }

    #[test]
    fn test_openai_requires_key_env() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "system.toml",
            &format!("{}\n[llm]\nprovider = \"openai\"\n", SYSTEM),
        );
        assert!(matches!(SystemConfig::load(&path), Err(RecError::Config(_))));
    }

    #[test]
    fn test_recall_config() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "recall.toml",
            r#"
index_path = "data/experts.idx"
description_path = "data/experts.json"
emb_model_path = "BAAI/bge-base-zh-v1.5"
"#,
        );

        let config = RecallConfig::load(&path).unwrap();
        assert_eq!(config.index_path, dir.path().join("data/experts.idx"));
        assert_eq!(config.emb_model_path, "BAAI/bge-base-zh-v1.5");
        assert_eq!(config.backend, IndexBackend::Flat);
        assert_eq!(config.max_length, DEFAULT_MAX_LENGTH);
    }

    #[test]
    fn test_qdrant_backend_needs_url() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "recall.toml",
            "index_path = \"a\"\ndescription_path = \"b\"\nemb_model_path = \"./m\"\nbackend = \"qdrant\"\n",
        );
        assert!(RecallConfig::load(&path).is_err());
    }

    #[test]
    fn test_agent_templates_layering() {
        let dir = TempDir::new().unwrap();
        let prompt_path = write(&dir, "p.json", r#"{"output_format": "FROM FILE"}"#);
        let mut settings = AgentSettings {
            prompt_config: Some(prompt_path),
            ..Default::default()
        };
        settings
            .prompts
            .insert("examples".to_string(), "INLINE".to_string());

        let templates = settings.templates(AgentRole::Explainer).unwrap();
        assert_eq!(templates.slot("output_format"), Some("FROM FILE"));
        assert_eq!(templates.slot("examples"), Some("INLINE"));
        assert!(templates.slot("instruction").is_some());
    }

    #[test]
    fn test_model_config_falls_back_to_llm_default() {
        let settings = AgentSettings::default();
        let model = settings.model_config(&LlmSettings::default());
        assert_eq!(model.model, DEFAULT_MODEL);
        assert_eq!(model.temperature, Some(0.0));
    }
}
