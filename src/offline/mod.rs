//! Offline batch jobs: expert analysis and index build
//!
//! Both run outside the request path. The index and the expert table are
//! always written together, stamped with one version.

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::{Agent, AgentRole, PromptArgs};
use crate::embedding::Embedder;
use crate::errors::{RecError, Result};
use crate::index::{ExpertTable, IndexArtifact};
use crate::types::ExpertRecord;

/// Index artifact file name inside the output directory
pub const INDEX_FILE: &str = "experts.idx";
/// Expert table file name inside the output directory
pub const TABLE_FILE: &str = "experts.json";

/// Expert row as exported from the source system
///
/// History fields hold one project per line; names and infos pair up by
/// line number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExpertProfile {
    pub expert_id: String,
    pub expert_name: String,
    #[serde(default)]
    pub specialist: String,
    #[serde(default)]
    pub workplace: String,
    #[serde(default)]
    pub history_item_name: String,
    #[serde(default)]
    pub history_item_info: String,
}

impl RawExpertProfile {
    /// `name: info` for each past project
    pub fn project_pairs(&self) -> Vec<String> {
        self.history_item_name
            .split('\n')
            .zip(self.history_item_info.split('\n'))
            .map(|(name, info)| format!("{}: {}", name, info))
            .collect()
    }
}

/// Text embedded for an expert
pub fn build_expert_text(profile: &RawExpertProfile) -> String {
    format!(
        "专业:{} 单位:{} {}",
        profile.specialist,
        profile.workplace,
        profile.project_pairs().join("项目:")
    )
}

pub fn load_profiles(path: &Path) -> Result<Vec<RawExpertProfile>> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

pub fn load_records(path: &Path) -> Result<Vec<ExpertRecord>> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

pub fn save_records(path: &Path, records: &[ExpertRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(records)?)?;
    Ok(())
}

fn progress_bar(len: usize, label: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.cyan} {msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_message(label.to_string());
    pb
}

/// Generate a description for every profile with the Expert Analyst
///
/// Profiles are processed in order; the first failure stops the job.
pub async fn analyze_experts(
    agent: &Agent,
    profiles: &[RawExpertProfile],
    show_progress: bool,
) -> Result<Vec<ExpertRecord>> {
    if agent.role() != AgentRole::ExpertAnalyst {
        return Err(RecError::Config(format!(
            "Expert analysis needs the ExpertAnalyst agent, got {}",
            agent.role()
        )));
    }

    let pb = progress_bar(profiles.len(), "Processing experts", show_progress);
    let mut records = Vec::with_capacity(profiles.len());

    for profile in profiles {
        let args = PromptArgs::new()
            .with("expert_name", profile.expert_name.as_str())
            .with("specialty", profile.specialist.as_str())
            .with("projects", profile.project_pairs().join("\n"));
        let description = agent.invoke(&args).await.map_err(|e| {
            pb.abandon();
            e
        })?;

        records.push(ExpertRecord {
            expert_id: profile.expert_id.clone(),
            name: profile.expert_name.clone(),
            specialist: profile.specialist.clone(),
            description: description.trim().to_string(),
        });
        pb.inc(1);
    }

    pb.finish_with_message("Experts analysed");
    info!(experts = records.len(), "expert analysis complete");
    Ok(records)
}

/// Files written by [`build_index`]
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutput {
    pub version: Uuid,
    pub index_path: PathBuf,
    pub table_path: PathBuf,
    pub rows: usize,
    pub dimension: usize,
}

/// Embed every profile and write the index and expert table
///
/// Row order follows `profiles`. Descriptions come from `described`,
/// matched on `expert_id`; experts without one get an empty description.
/// A failed embedding aborts the build so no row is ever skipped.
pub fn build_index(
    embedder: &dyn Embedder,
    profiles: &[RawExpertProfile],
    described: &[ExpertRecord],
    model: &str,
    output_dir: &Path,
    show_progress: bool,
) -> Result<BuildOutput> {
    if profiles.is_empty() {
        return Err(RecError::InvalidInput("No expert profiles to index".to_string()));
    }

    let descriptions: HashMap<&str, &str> = described
        .iter()
        .map(|r| (r.expert_id.as_str(), r.description.as_str()))
        .collect();

    let pb = progress_bar(profiles.len(), "Generating embeddings", show_progress);
    let mut vectors = Vec::with_capacity(profiles.len());
    let mut records = Vec::with_capacity(profiles.len());
    let mut undescribed = 0usize;

    for profile in profiles {
        let vector = embedder.embed(&build_expert_text(profile)).map_err(|e| {
            pb.abandon();
            RecError::Encoding(format!("Expert {}: {}", profile.expert_id, e))
        })?;
        vectors.push(vector);

        let description = descriptions.get(profile.expert_id.as_str()).copied();
        if description.is_none() {
            undescribed += 1;
        }
        records.push(ExpertRecord {
            expert_id: profile.expert_id.clone(),
            name: profile.expert_name.clone(),
            specialist: profile.specialist.clone(),
            description: description.unwrap_or_default().to_string(),
        });
        pb.inc(1);
    }
    pb.finish_with_message("Embeddings generated");

    if undescribed > 0 {
        warn!(undescribed, "experts indexed without a description");
    }

    let version = Uuid::new_v4();
    let artifact = IndexArtifact::new(version, model, vectors);
    // Validates shape before anything is written
    artifact.to_index()?;

    let index_path = output_dir.join(INDEX_FILE);
    let table_path = output_dir.join(TABLE_FILE);
    artifact.save(&index_path)?;
    ExpertTable::new(version, records).save(&table_path)?;

    info!(
        %version,
        rows = profiles.len(),
        dimension = artifact.dimension,
        path = %index_path.display(),
        "index built"
    );

    Ok(BuildOutput {
        version,
        index_path,
        table_path,
        rows: profiles.len(),
        dimension: artifact.dimension,
    })
}
