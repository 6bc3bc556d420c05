//! Closed set of agent roles

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{RecError, Result};

/// Reasoning roles of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentRole {
    /// Summarises the procurement project
    ProjectAnalyst,
    /// Writes expert descriptions (offline backfill)
    ExpertAnalyst,
    /// Orders recalled candidates
    Recommender,
    /// Justifies the final picks
    Explainer,
}

impl AgentRole {
    pub const ALL: [AgentRole; 4] = [
        AgentRole::ProjectAnalyst,
        AgentRole::ExpertAnalyst,
        AgentRole::Recommender,
        AgentRole::Explainer,
    ];

    /// Roles the online pipeline cannot run without
    pub const ONLINE: [AgentRole; 3] = [
        AgentRole::ProjectAnalyst,
        AgentRole::Recommender,
        AgentRole::Explainer,
    ];

    /// Config key
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::ProjectAnalyst => "ProjectAnalyst",
            AgentRole::ExpertAnalyst => "ExpertAnalyst",
            AgentRole::Recommender => "Recommender",
            AgentRole::Explainer => "Explainer",
        }
    }

    /// Localized label shown on observations
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::ProjectAnalyst => "项目分析器",
            AgentRole::ExpertAnalyst => "专家分析器",
            AgentRole::Recommender => "专家排序器",
            AgentRole::Explainer => "推荐解释器",
        }
    }

    /// Whether the role must answer with a JSON object
    pub fn expects_json(&self) -> bool {
        matches!(self, AgentRole::Recommender)
    }
}

impl FromStr for AgentRole {
    type Err = RecError;

    fn from_str(s: &str) -> Result<Self> {
        AgentRole::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| RecError::Config(format!("Agent {} is not supported", s)))
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
