//! Recall evaluation: hit rates and mean rank of the true expert

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::errors::{RecError, Result};
use crate::recall::CandidateRecall;

/// Cutoffs reported by [`RecallReport::hit_rates`]
pub const HIT_CUTOFFS: [usize; 9] = [10, 20, 30, 40, 50, 60, 70, 80, 100];

/// Default number of candidates retrieved per case
pub const DEFAULT_DEPTH: usize = 1000;

/// A project paired with the expert who actually reviewed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallCase {
    pub project_name: String,
    pub project_infos: String,
    pub expert_id: String,
}

impl RecallCase {
    fn query_text(&self) -> String {
        format!("{} {}", self.project_name, self.project_infos)
    }
}

pub fn load_cases(path: &Path) -> Result<Vec<RecallCase>> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecallReport {
    /// Cutoff → percentage of cases whose expert ranked within it
    pub hit_rates: BTreeMap<usize, f64>,
    pub average_rank: f64,
    /// 1-based rank per case; a miss is `depth + 1`
    pub ranks: Vec<usize>,
    pub depth: usize,
}

/// Score one ranked id list per case
///
/// `ranked[i]` is the retrieval order for `true_ids[i]`.
pub fn evaluate_recall(
    true_ids: &[String],
    ranked: &[Vec<String>],
    depth: usize,
) -> Result<RecallReport> {
    if true_ids.is_empty() {
        return Err(RecError::InvalidInput("No evaluation cases".to_string()));
    }
    if true_ids.len() != ranked.len() {
        return Err(RecError::InvalidInput(format!(
            "{} cases but {} ranked lists",
            true_ids.len(),
            ranked.len()
        )));
    }

    let ranks: Vec<usize> = true_ids
        .iter()
        .zip(ranked)
        .map(|(truth, ids)| {
            ids.iter()
                .take(depth)
                .position(|id| id == truth)
                .map_or(depth + 1, |p| p + 1)
        })
        .collect();

    let total = ranks.len() as f64;
    let hit_rates = HIT_CUTOFFS
        .iter()
        .map(|&k| {
            let hits = ranks.iter().filter(|&&r| r <= k).count();
            (k, hits as f64 / total * 100.0)
        })
        .collect();
    let average_rank = ranks.iter().sum::<usize>() as f64 / total;

    Ok(RecallReport {
        hit_rates,
        average_rank,
        ranks,
        depth,
    })
}

/// Run every case through recall and score the results
pub async fn run_recall_eval(
    recall: &CandidateRecall,
    cases: &[RecallCase],
    depth: usize,
) -> Result<RecallReport> {
    let depth = depth.clamp(1, recall.index_size());
    let mut ranked = Vec::with_capacity(cases.len());

    for case in cases {
        let candidates = recall.recall(&case.query_text(), depth).await?;
        debug!(
            expert_id = %case.expert_id,
            top = ?candidates.iter().take(5).map(|c| (&c.expert_id, c.similarity)).collect::<Vec<_>>(),
            "evaluated case"
        );
        ranked.push(candidates.into_iter().map(|c| c.expert_id).collect());
    }

    let true_ids: Vec<String> = cases.iter().map(|c| c.expert_id.clone()).collect();
    evaluate_recall(&true_ids, &ranked, depth)
}
