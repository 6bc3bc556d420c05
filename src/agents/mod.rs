//! Reasoning agents
//!
//! Every role is the same [`Agent`] type configured with different
//! templates; the roles themselves are a closed enum.

pub mod agent;
pub mod factory;
pub mod output;
pub mod prompt;
pub mod role;

pub use agent::{Agent, DEFAULT_LLM_TIMEOUT};
pub use factory::{AgentFactory, AgentSet};
pub use output::{attach_descriptions, format_ranking, parse_json_object, parse_ranking};
pub use prompt::{PromptArgs, PromptTemplates};
pub use role::AgentRole;
