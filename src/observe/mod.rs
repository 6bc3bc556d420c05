//! Observation side channel
//!
//! Stages report what they produced (analysis text, recalled candidates,
//! formatted ranking, explanation) to an [`ObservationSink`]. Sinks never
//! influence the pipeline's return value.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::agents::AgentRole;
use crate::types::CandidateExpert;

/// Who produced an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogSource {
    Agent(AgentRole),
    /// The candidate recall step
    Searcher,
}

impl LogSource {
    pub fn display_name(&self) -> &'static str {
        match self {
            LogSource::Agent(role) => role.display_name(),
            LogSource::Searcher => "专家召回器",
        }
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Observation content
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationPayload {
    Text(String),
    Candidates(Vec<CandidateExpert>),
    /// Formatted ranking lines
    Ranking(Vec<String>),
}

impl ObservationPayload {
    /// Single-string rendering for log lines
    pub fn summary(&self) -> String {
        match self {
            ObservationPayload::Text(text) => text.clone(),
            ObservationPayload::Candidates(candidates) => {
                serde_json::to_string(candidates).unwrap_or_else(|_| {
                    format!("{} candidates", candidates.len())
                })
            }
            ObservationPayload::Ranking(lines) => lines.concat(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub source: LogSource,
    pub payload: ObservationPayload,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    pub fn new(source: LogSource, payload: ObservationPayload) -> Self {
        Self {
            source,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn text(source: LogSource, text: impl Into<String>) -> Self {
        Self::new(source, ObservationPayload::Text(text.into()))
    }
}

/// Receiver of pipeline observations
pub trait ObservationSink: Send + Sync {
    fn observe(&self, observation: Observation);
}

/// Forwards observations to `tracing` at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservationSink for TracingSink {
    fn observe(&self, observation: Observation) {
        debug!(
            source = %observation.source,
            payload = %observation.payload.summary(),
            "observation"
        );
    }
}

/// Keeps every observation in memory, in arrival order
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<Observation>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Observation> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Observations emitted by `source`
    pub fn from_source(&self, source: LogSource) -> Vec<Observation> {
        self.entries()
            .into_iter()
            .filter(|o| o.source == source)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl ObservationSink for RecordingSink {
    fn observe(&self, observation: Observation) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(observation);
        }
    }
}
