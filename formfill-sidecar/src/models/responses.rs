use chrono::{DateTime, Utc};
use serde::Serialize;

use super::mapping::MappingSet;
use super::session::{ReplayReport, ReplayState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub origins: usize,
    pub active_replays: usize,
}

/// One row of the mapping listing
#[derive(Debug, Serialize)]
pub struct MappingSummary {
    pub origin: String,
    pub source_url: String,
    pub trained_at: DateTime<Utc>,
    pub fields: usize,
    pub mapped: usize,
    pub stale: usize,
}

impl From<&MappingSet> for MappingSummary {
    fn from(set: &MappingSet) -> Self {
        Self {
            origin: set.origin.clone(),
            source_url: set.source_url.clone(),
            trained_at: set.trained_at,
            fields: set.mappings.len(),
            mapped: set.mapped_count(),
            stale: set.mappings.iter().filter(|m| m.stale).count(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StartReplayResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ReplayStatusResponse {
    pub session_id: String,
    pub state: ReplayState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReplayReport>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub origin: String,
}

#[derive(Debug, Serialize)]
pub struct GenericResponse {
    pub status: String,
}
