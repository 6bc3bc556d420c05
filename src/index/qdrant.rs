// Qdrant-backed expert index
use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        value::Kind, vectors_config::Config, with_payload_selector::SelectorOptions,
        CreateCollection, Distance, PointStruct, ScoredPoint, ScrollPoints, SearchPoints,
        Value as QdrantValue, VectorParams, VectorsConfig, WithPayloadSelector,
    },
};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{RecError, Result};
use crate::index::{ranking_order, ExpertTable, FlatIndex, ScoredIndex, VectorIndex};

/// Points are upserted in batches of this size
const UPSERT_BATCH: usize = 256;

/// Extra hits fetched past `k` so ties at the cut are resolved by position
///
/// Ties wider than this margin at the boundary still follow server order.
const TIE_MARGIN: usize = 8;

/// Payload key holding the expert table version a point was pushed from
const VERSION_KEY: &str = "version";

fn unavailable(context: &str, err: impl std::fmt::Display) -> RecError {
    RecError::IndexUnavailable(format!("{}: {}", context, err))
}

/// Expert index stored in a Qdrant collection
///
/// Point ids are table positions, so the collection must be repopulated
/// whenever the expert table is rebuilt.
pub struct QdrantIndex {
    client: QdrantClient,
    collection: String,
    dimension: usize,
    count: usize,
}

impl QdrantIndex {
    /// Connect to an existing, populated collection (fails fast otherwise)
    ///
    /// The collection must have been pushed from the expert table stamped
    /// `version`; a stale collection is rejected with `IndexUnavailable`.
    pub async fn connect(
        url: &str,
        collection: &str,
        dimension: usize,
        version: Uuid,
    ) -> Result<Self> {
        let client = QdrantClient::from_url(url)
            .build()
            .map_err(|e| unavailable("Failed to create Qdrant client", e))?;

        let collections = client
            .list_collections()
            .await
            .map_err(|e| unavailable("Failed to list collections", e))?;
        if !collections.collections.iter().any(|c| c.name == collection) {
            return Err(RecError::IndexUnavailable(format!(
                "Qdrant collection '{}' does not exist",
                collection
            )));
        }

        let info = client
            .collection_info(collection)
            .await
            .map_err(|e| unavailable("Failed to get collection info", e))?;
        let count = info.result.and_then(|r| r.points_count).unwrap_or(0) as usize;
        if count == 0 {
            return Err(RecError::IndexUnavailable(format!(
                "Qdrant collection '{}' is empty",
                collection
            )));
        }

        let sample = client
            .scroll(&ScrollPoints {
                collection_name: collection.to_string(),
                limit: Some(1),
                with_payload: Some(true.into()),
                ..Default::default()
            })
            .await
            .map_err(|e| unavailable("Failed to read collection payload", e))?;
        let payload = sample
            .result
            .into_iter()
            .next()
            .map(|point| point.payload)
            .unwrap_or_default();
        check_version(&payload, version, collection)?;

        info!(collection, count, %version, "connected to qdrant index");

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
            count,
        })
    }

    /// Create (or recreate) `collection` and load the flat index into it
    pub async fn populate(
        url: &str,
        collection: &str,
        index: &FlatIndex,
        table: &ExpertTable,
    ) -> Result<Self> {
        let client = QdrantClient::from_url(url)
            .build()
            .map_err(|e| unavailable("Failed to create Qdrant client", e))?;

        let collections = client
            .list_collections()
            .await
            .map_err(|e| unavailable("Failed to list collections", e))?;
        if collections.collections.iter().any(|c| c.name == collection) {
            client
                .delete_collection(collection)
                .await
                .map_err(|e| unavailable("Failed to drop stale collection", e))?;
        }

        client
            .create_collection(&CreateCollection {
                collection_name: collection.to_string(),
                vectors_config: Some(VectorsConfig {
                    config: Some(Config::Params(VectorParams {
                        size: index.dimension() as u64,
                        distance: Distance::Dot.into(),
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| unavailable("Failed to create collection", e))?;

        let points: Vec<PointStruct> = index
            .rows()
            .enumerate()
            .map(|(position, row)| {
                let mut payload = HashMap::new();
                if let Some(record) = table.get(position) {
                    payload.insert(
                        "expert_id".to_string(),
                        QdrantValue::from(record.expert_id.clone()),
                    );
                }
                payload.insert(
                    VERSION_KEY.to_string(),
                    QdrantValue::from(table.version.to_string()),
                );
                PointStruct::new(position as u64, row.to_vec(), payload)
            })
            .collect();

        for batch in points.chunks(UPSERT_BATCH) {
            client
                .upsert_points_blocking(collection, None, batch.to_vec(), None)
                .await
                .map_err(|e| unavailable("Failed to upsert points", e))?;
            debug!(collection, batch = batch.len(), "upserted points");
        }

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension: index.dimension(),
            count: index.len(),
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredIndex>> {
        if query.len() != self.dimension {
            return Err(RecError::InvalidInput(format!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        let search_result = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection.clone(),
                vector: query.to_vec(),
                limit: (k + TIE_MARGIN) as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(false)),
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| unavailable("Failed to search points", e))?;

        Ok(top_hits(search_result.result, k))
    }

    fn len(&self) -> usize {
        self.count
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Order server hits by similarity then position and keep the first `k`
fn top_hits(points: Vec<ScoredPoint>, k: usize) -> Vec<ScoredIndex> {
    let mut hits: Vec<ScoredIndex> = points
        .into_iter()
        .filter_map(|point| {
            point_position(&point.id).map(|position| ScoredIndex {
                position,
                similarity: point.score,
            })
        })
        .collect();
    hits.sort_by(ranking_order);
    hits.truncate(k);
    hits
}

fn check_version(
    payload: &HashMap<String, QdrantValue>,
    expected: Uuid,
    collection: &str,
) -> Result<()> {
    let stored = payload.get(VERSION_KEY).and_then(|value| match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.as_str()),
        _ => None,
    });

    match stored {
        Some(stored) if stored == expected.to_string() => Ok(()),
        Some(stored) => Err(RecError::IndexUnavailable(format!(
            "Qdrant collection '{}' was pushed from table version {} but the expert table is {}",
            collection, stored, expected
        ))),
        None => Err(RecError::IndexUnavailable(format!(
            "Qdrant collection '{}' carries no table version",
            collection
        ))),
    }
}

fn point_position(point_id: &Option<qdrant_client::qdrant::PointId>) -> Option<usize> {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match point_id.as_ref()?.point_id_options.as_ref()? {
        PointIdOptions::Num(n) => Some(*n as usize),
        PointIdOptions::Uuid(_) => None,
    }
}
