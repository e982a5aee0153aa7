use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::extensions::SignalResolver;
use crate::models::ReplayReport;
use crate::recording::Trainer;
use crate::replay::{ReplayEvent, ReplayHandle};
use crate::store::MappingStore;

/// Finished reports kept for status polling
const MAX_FINISHED_REPLAYS: usize = 256;

/// A replay that has not finished yet
pub struct ActiveReplay {
    pub handle: ReplayHandle,
    /// Completes a CAPTCHA wait when the UI reports it solved
    pub captcha: SignalResolver,
    pub started_at: DateTime<Utc>,
}

/// Shared application state
pub struct AppState {
    pub config: Config,

    pub store: MappingStore,

    pub trainer: Trainer,

    /// Running replays: session_id -> handle
    pub replays: DashMap<String, ActiveReplay>,

    /// Reports of recently finished replays: session_id -> report
    pub finished: DashMap<String, ReplayReport>,

    /// Broadcast channel for replay progress, forwarded to WebSocket clients
    pub events: broadcast::Sender<ReplayEvent>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = match &config.db_path {
            Some(path) => match MappingStore::open(path) {
                Ok(store) => store,
                Err(e) => {
                    tracing::error!("Failed to open mapping store at {}: {:#}", path.display(), e);
                    MappingStore::in_memory()
                }
            },
            None => MappingStore::in_memory(),
        };

        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: MappingStore) -> Self {
        let (tx, _) = broadcast::channel(1024);

        Self {
            config,
            trainer: Trainer::new(store.clone()),
            store,
            replays: DashMap::new(),
            finished: DashMap::new(),
            events: tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplayEvent> {
        self.events.subscribe()
    }

    /// Move a replay from the active table to the finished one
    pub fn finish_replay(&self, report: ReplayReport) {
        self.replays.remove(&report.session_id);

        if self.finished.len() >= MAX_FINISHED_REPLAYS {
            let oldest = self
                .finished
                .iter()
                .min_by_key(|entry| entry.value().completed_at)
                .map(|entry| entry.key().clone());
            if let Some(session_id) = oldest {
                self.finished.remove(&session_id);
            }
        }

        self.finished.insert(report.session_id.clone(), report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReplayState, ReplaySummary};
    use std::collections::BTreeMap;

    fn report(id: &str) -> ReplayReport {
        ReplayReport {
            session_id: id.to_string(),
            origin: "example.com".to_string(),
            state: ReplayState::Completed,
            results: Vec::new(),
            summary: ReplaySummary::default(),
            error: None,
            extension_stats: BTreeMap::new(),
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_finished_replays_are_bounded() {
        let state = AppState::with_store(Config::default(), MappingStore::in_memory());
        for i in 0..(MAX_FINISHED_REPLAYS + 10) {
            state.finish_replay(report(&format!("s{}", i)));
        }
        assert_eq!(state.finished.len(), MAX_FINISHED_REPLAYS);
        assert!(state.finished.contains_key(&format!("s{}", MAX_FINISHED_REPLAYS + 9)));
    }

    #[test]
    fn test_finish_removes_active_entry() {
        let state = AppState::with_store(Config::default(), MappingStore::in_memory());
        let handle = ReplayHandle::with_events(state.events.clone());
        let id = handle.session_id().to_string();
        state.replays.insert(
            id.clone(),
            ActiveReplay {
                handle,
                captcha: SignalResolver::new(),
                started_at: Utc::now(),
            },
        );

        state.finish_replay(report(&id));
        assert!(!state.replays.contains_key(&id));
        assert!(state.finished.contains_key(&id));
    }
}
