//! Expert and project records flowing through the pipeline

use serde::{Deserialize, Serialize};

/// Separator between project name and description in the recall text
pub const RECALL_TEXT_SEPARATOR: &str = ":";

/// Expert row of the serving-time expert table
///
/// Immutable at serving time; looked up by its row position in the
/// vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertRecord {
    pub expert_id: String,
    #[serde(rename = "expert_name", alias = "name")]
    pub name: String,
    pub specialist: String,
    /// Generated narrative, empty until backfilled
    #[serde(default)]
    pub description: String,
}

/// Project submitted for recommendation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectQuery {
    pub name: String,
    pub description: String,
}

impl ProjectQuery {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Text embedded for candidate recall (`name:description`)
    pub fn recall_text(&self) -> String {
        format!("{}{}{}", self.name, RECALL_TEXT_SEPARATOR, self.description)
    }
}

/// Expert recalled for a query, with its cosine similarity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateExpert {
    pub expert_id: String,
    #[serde(rename = "expert_name")]
    pub name: String,
    pub specialist: String,
    pub description: String,
    pub similarity: f32,
}

impl CandidateExpert {
    pub fn from_record(record: &ExpertRecord, similarity: f32) -> Self {
        Self {
            expert_id: record.expert_id.clone(),
            name: record.name.clone(),
            specialist: record.specialist.clone(),
            description: record.description.clone(),
            similarity,
        }
    }
}

/// Expert placed by the Recommender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedExpert {
    pub rank: u32,
    pub name: String,
    pub specialist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RankedExpert {
    /// Externally visible line: `排名: {rank}, 姓名: {name}, 专业: {specialist}`
    pub fn display_line(&self) -> String {
        format!(
            "排名: {}, 姓名: {}, 专业: {}  \n",
            self.rank, self.name, self.specialist
        )
    }
}
