use serde::Serialize;
use serde_json::Value;

use super::extractor::extract_mappings;
use super::normalizer::normalize;
use crate::error::TrainingError;
use crate::models::{normalize_origin, FieldMapping, MappingSet, Recording};
use crate::store::MappingStore;

/// Result of training one recording
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub origin: String,
    pub source_url: String,
    pub fields_learned: usize,
    pub mapped: usize,
    pub unmapped: usize,
    pub mappings: Vec<FieldMapping>,
}

impl TrainingReport {
    fn from_set(set: &MappingSet) -> Self {
        let mapped = set.mapped_count();
        Self {
            origin: set.origin.clone(),
            source_url: set.source_url.clone(),
            fields_learned: set.mappings.len(),
            mapped,
            unmapped: set.mappings.len() - mapped,
            mappings: set.mappings.clone(),
        }
    }
}

/// Turns recorder exports into stored mapping sets
#[derive(Clone)]
pub struct Trainer {
    store: MappingStore,
}

impl Trainer {
    pub fn new(store: MappingStore) -> Self {
        Self { store }
    }

    /// Normalize and extract without touching the store.
    ///
    /// `url_hint` is used when the recording never navigates and carries no
    /// asserted URL.
    pub fn learn(&self, raw: &Value, url_hint: Option<&str>) -> Result<(Recording, MappingSet), TrainingError> {
        let recording = normalize(raw)?;

        let source_url = recording
            .source_url
            .clone()
            .or_else(|| url_hint.map(str::to_string))
            .ok_or(TrainingError::NoOrigin)?;
        let origin = normalize_origin(&source_url).ok_or(TrainingError::NoOrigin)?;

        let mappings = extract_mappings(&recording);
        if mappings.is_empty() {
            return Err(TrainingError::NoFormFields);
        }

        let set = MappingSet::new(&origin, source_url, mappings);
        Ok((recording, set))
    }

    /// Learn from a recording and replace the stored set for its origin
    pub async fn train(&self, raw: &Value, url_hint: Option<&str>) -> Result<TrainingReport, TrainingError> {
        let (recording, set) = self.learn(raw, url_hint)?;
        let report = self.save(set).await?;

        tracing::info!(
            "Trained {} from {:?}: {} fields ({} mapped, {} unmapped)",
            report.origin,
            recording.title.as_deref().unwrap_or("untitled recording"),
            report.fields_learned,
            report.mapped,
            report.unmapped
        );

        Ok(report)
    }

    /// Store a learned (possibly live-analyzed) set, replacing the origin's previous one.
    ///
    /// Fails with `Superseded` when the store already holds a later training.
    pub async fn save(&self, set: MappingSet) -> Result<TrainingReport, TrainingError> {
        let report = TrainingReport::from_set(&set);
        let origin = set.origin.clone();

        let stored = self
            .store
            .put(set)
            .await
            .map_err(|e| TrainingError::Persistence(e.to_string()))?;
        if !stored {
            tracing::warn!("A newer mapping set for {} is already stored, keeping it", origin);
            return Err(TrainingError::Superseded { origin });
        }

        Ok(report)
    }
}
