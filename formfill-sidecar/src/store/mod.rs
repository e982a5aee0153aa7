pub mod repository;

pub use repository::{default_db_path, MappingRepository};

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::TrainingError;
use crate::models::{normalize_origin, FieldMapping, MappingSet};
use crate::recording::normalize_field_name;

/// Where a profile field is mapped, for cross-origin search
#[derive(Debug, Clone, Serialize)]
pub struct FieldMatch {
    pub origin: String,
    pub mapping: FieldMapping,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub origins: usize,
    pub total_mappings: usize,
    pub mapped: usize,
    pub unmapped: usize,
    pub stale: usize,
    /// Mapped selectors per profile field
    pub fields: BTreeMap<String, usize>,
}

struct StoreInner {
    sets: DashMap<String, Arc<MappingSet>>,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
    repository: Option<MappingRepository>,
}

/// Shared origin -> mapping set store.
///
/// Reads never block. Writes to the same origin are serialized, and a write
/// always replaces the whole set so readers see either the old or the new one.
#[derive(Clone)]
pub struct MappingStore {
    inner: Arc<StoreInner>,
}

impl MappingStore {
    pub fn in_memory() -> Self {
        Self::with_repository(None)
    }

    /// Open a SQLite-backed store and load every persisted set into memory
    pub fn open(path: &Path) -> Result<Self> {
        let repository = MappingRepository::open(path)?;
        let sets = repository.load_all()?;
        let store = Self::with_repository(Some(repository));
        for set in sets {
            store.inner.sets.insert(set.origin.clone(), Arc::new(set));
        }
        tracing::info!(
            "Mapping store opened at {} with {} origins",
            path.display(),
            store.inner.sets.len()
        );
        Ok(store)
    }

    fn with_repository(repository: Option<MappingRepository>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                sets: DashMap::new(),
                write_locks: DashMap::new(),
                repository,
            }),
        }
    }

    fn write_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.inner
            .write_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Mapping set for an origin, URL or host
    pub fn get(&self, origin: &str) -> Option<Arc<MappingSet>> {
        let key = normalize_origin(origin)?;
        self.inner.sets.get(&key).map(|entry| entry.value().clone())
    }

    pub fn has(&self, origin: &str) -> bool {
        normalize_origin(origin).is_some_and(|key| self.inner.sets.contains_key(&key))
    }

    /// Replace the set for its origin.
    ///
    /// Returns `false` without writing when the stored set was trained later
    /// than the incoming one.
    pub async fn put(&self, mut set: MappingSet) -> Result<bool> {
        let key = normalize_origin(&set.origin).ok_or_else(|| anyhow!("Invalid origin: {}", set.origin))?;
        set.origin = key.clone();

        let lock = self.write_lock(&key);
        let _guard = lock.lock().await;

        if let Some(existing) = self.inner.sets.get(&key) {
            if existing.trained_at > set.trained_at {
                tracing::warn!(
                    "Ignoring mapping set for {} trained at {}, store has {}",
                    key,
                    set.trained_at,
                    existing.trained_at
                );
                return Ok(false);
            }
        }

        if let Some(repository) = &self.inner.repository {
            repository.save(&set)?;
        }
        tracing::debug!("Stored {} mappings for {}", set.mappings.len(), key);
        self.inner.sets.insert(key, Arc::new(set));
        Ok(true)
    }

    /// All known origins, sorted
    pub fn all_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = self.inner.sets.iter().map(|e| e.key().clone()).collect();
        origins.sort();
        origins
    }

    pub async fn delete(&self, origin: &str) -> Result<bool> {
        let Some(key) = normalize_origin(origin) else {
            return Ok(false);
        };

        let lock = self.write_lock(&key);
        let removed = {
            let _guard = lock.lock().await;
            if let Some(repository) = &self.inner.repository {
                repository.delete(&key)?;
            }
            self.inner.sets.remove(&key).is_some()
        };

        // Only drop the entry when no other writer holds or waits on this lock
        self.inner
            .write_locks
            .remove_if(&key, |_, l| Arc::ptr_eq(l, &lock) && Arc::strong_count(l) <= 2);
        Ok(removed)
    }

    /// Every mapping across origins that fills the given profile field
    pub fn search_by_field(&self, field: &str) -> Vec<FieldMatch> {
        let field = normalize_field_name(field);
        let mut matches: Vec<FieldMatch> = self
            .inner
            .sets
            .iter()
            .flat_map(|entry| {
                let origin = entry.key().clone();
                entry
                    .value()
                    .mappings
                    .iter()
                    .filter(|m| m.profile_field.as_deref() == Some(field.as_str()))
                    .map(|m| FieldMatch {
                        origin: origin.clone(),
                        mapping: m.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        matches.sort_by(|a, b| a.origin.cmp(&b.origin).then(a.mapping.selector.cmp(&b.mapping.selector)));
        matches
    }

    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();
        for entry in self.inner.sets.iter() {
            stats.origins += 1;
            for mapping in &entry.value().mappings {
                stats.total_mappings += 1;
                if mapping.stale {
                    stats.stale += 1;
                }
                match &mapping.profile_field {
                    Some(field) => {
                        stats.mapped += 1;
                        *stats.fields.entry(field.clone()).or_default() += 1;
                    }
                    None => stats.unmapped += 1,
                }
            }
        }
        stats
    }

    /// Pretty JSON for one origin's set, in the persisted field layout
    pub fn export_json(&self, origin: &str) -> Result<Option<String>> {
        self.get(origin)
            .map(|set| serde_json::to_string_pretty(set.as_ref()).map_err(Into::into))
            .transpose()
    }

    /// Import a set previously produced by [`MappingStore::export_json`]
    pub async fn import_json(&self, json: &str) -> Result<String, TrainingError> {
        let set: MappingSet = serde_json::from_str(json)
            .map_err(|e| TrainingError::InvalidExport(format!("not a mapping set: {}", e)))?;
        let origin = normalize_origin(&set.origin).ok_or(TrainingError::NoOrigin)?;

        let stored = self
            .put(set)
            .await
            .map_err(|e| TrainingError::Persistence(e.to_string()))?;
        if !stored {
            return Err(TrainingError::Superseded { origin });
        }
        Ok(origin)
    }
}
