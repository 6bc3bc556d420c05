//! Persisted index artifact and its companion expert table
//!
//! Both files carry the same version stamp. Loading refuses a pair whose
//! versions or row counts disagree, since positions would then point at
//! the wrong experts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::errors::{RecError, Result};
use crate::index::{FlatIndex, VectorIndex};
use crate::types::ExpertRecord;

/// Serialized vector matrix, row order = expert table order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexArtifact {
    pub version: Uuid,
    pub created_at: DateTime<Utc>,
    /// Embedding model the vectors came from
    pub model: String,
    pub dimension: usize,
    pub vectors: Vec<Vec<f32>>,
}

/// Expert rows addressed by index position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertTable {
    pub version: Uuid,
    pub created_at: DateTime<Utc>,
    pub records: Vec<ExpertRecord>,
}

impl IndexArtifact {
    pub fn new(version: Uuid, model: impl Into<String>, vectors: Vec<Vec<f32>>) -> Self {
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        Self {
            version,
            created_at: Utc::now(),
            model: model.into(),
            dimension,
            vectors,
        }
    }

    /// Write with bincode, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, self).map_err(|e| {
            RecError::IndexUnavailable(format!("Failed to write index {}: {}", path.display(), e))
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            RecError::IndexUnavailable(format!("Cannot open index {}: {}", path.display(), e))
        })?;
        bincode::deserialize_from(BufReader::new(file)).map_err(|e| {
            RecError::IndexUnavailable(format!("Corrupt index {}: {}", path.display(), e))
        })
    }

    pub fn to_index(&self) -> Result<FlatIndex> {
        FlatIndex::build(&self.vectors)
    }
}

impl ExpertTable {
    pub fn new(version: Uuid, records: Vec<ExpertRecord>) -> Self {
        Self {
            version,
            created_at: Utc::now(),
            records,
        }
    }

    /// Row at `position`
    pub fn get(&self, position: usize) -> Option<&ExpertRecord> {
        self.records.get(position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            RecError::IndexUnavailable(format!(
                "Cannot read expert table {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            RecError::IndexUnavailable(format!("Corrupt expert table {}: {}", path.display(), e))
        })
    }
}

/// Load an index/table pair and check they belong together
pub fn load_versioned(index_path: &Path, table_path: &Path) -> Result<(FlatIndex, ExpertTable)> {
    let artifact = IndexArtifact::load(index_path)?;
    let table = ExpertTable::load(table_path)?;

    if artifact.version != table.version {
        return Err(RecError::IndexUnavailable(format!(
            "Index version {} does not match expert table version {}",
            artifact.version, table.version
        )));
    }

    let index = artifact.to_index()?;
    if index.len() != table.len() {
        return Err(RecError::IndexUnavailable(format!(
            "Index holds {} vectors but expert table holds {} rows",
            index.len(),
            table.len()
        )));
    }

    info!(
        version = %artifact.version,
        experts = table.len(),
        dimension = index.dimension(),
        "loaded expert index"
    );

    Ok((index, table))
}
