//! Component wiring from configuration

use std::sync::Arc;
use tracing::info;

use crate::agents::{AgentFactory, AgentRole};
use crate::config::{IndexBackend, RecallConfig, SystemConfig};
use crate::embedding::{Embedder, EmbeddingEngine};
use crate::errors::{RecError, Result};
use crate::index::artifact::load_versioned;
use crate::index::{ExpertTable, QdrantIndex, VectorIndex};
use crate::observe::ObservationSink;
use crate::pipeline::Orchestrator;
use crate::recall::{CandidateRecall, RecallTimeouts};

/// Load the embedder, index and expert table named by `recall`
///
/// Every resource is opened here so a missing or mismatched index fails
/// before the first request.
pub async fn load_recall(recall: &RecallConfig, system: &SystemConfig) -> Result<CandidateRecall> {
    let model = recall.emb_model_path.clone();
    let max_length = recall.max_length;
    let engine = tokio::task::spawn_blocking(move || EmbeddingEngine::load(&model, max_length))
        .await
        .map_err(|e| RecError::Encoding(format!("Embedding model load task failed: {}", e)))??;
    let embedder: Arc<dyn Embedder> = Arc::new(engine);

    let (index, table): (Arc<dyn VectorIndex>, ExpertTable) = match recall.backend {
        IndexBackend::Flat => {
            let (index, table) = load_versioned(&recall.index_path, &recall.description_path)?;
            (Arc::new(index), table)
        }
        IndexBackend::Qdrant => {
            let (url, collection) = qdrant_target(recall)?;
            let table = ExpertTable::load(&recall.description_path)?;
            let index =
                QdrantIndex::connect(url, collection, embedder.dimension(), table.version).await?;
            (Arc::new(index), table)
        }
    };

    info!(
        backend = ?recall.backend,
        experts = table.len(),
        dimension = embedder.dimension(),
        "recall resources loaded"
    );

    Ok(
        CandidateRecall::new(embedder, index, Arc::new(table))?.with_timeouts(RecallTimeouts {
            embedding: system.timeouts.embedding(),
            index: system.timeouts.index(),
        }),
    )
}

pub fn qdrant_target(recall: &RecallConfig) -> Result<(&str, &str)> {
    match (recall.qdrant_url.as_deref(), recall.collection.as_deref()) {
        (Some(url), Some(collection)) => Ok((url, collection)),
        _ => Err(RecError::Config(
            "qdrant_url and collection must be set to use Qdrant".to_string(),
        )),
    }
}

/// Build the online orchestrator from a loaded system config
pub async fn load_system(
    config: &SystemConfig,
    sink: Arc<dyn ObservationSink>,
) -> Result<Orchestrator> {
    let agents = AgentFactory::new(config).build_all(&AgentRole::ONLINE)?;
    let recall = load_recall(&config.recall()?, config).await?;
    Orchestrator::new(agents, recall, sink)
}
