use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::mapping::FieldMapping;
use super::profile::Profile;
use super::recording::{Step, StepKind};
use crate::error::{SessionError, StepError};
use crate::extensions::ExtensionPipeline;

/// Replay lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayState {
    #[default]
    Idle,
    Initializing,
    Running,
    Completed,
    Aborted,
}

impl ReplayState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplayState::Completed | ReplayState::Aborted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Skipped,
    Failed,
}

/// Outcome of one step in a replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_index: usize,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_field: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl StepOutcome {
    pub fn success(step_index: usize, selector_used: Option<String>, duration_ms: u64) -> Self {
        Self {
            step_index,
            status: StepStatus::Success,
            error_detail: None,
            selector_used,
            profile_field: None,
            duration_ms,
        }
    }

    pub fn skipped(step_index: usize, reason: &StepError) -> Self {
        Self {
            step_index,
            status: StepStatus::Skipped,
            error_detail: Some(reason.to_string()),
            selector_used: None,
            profile_field: None,
            duration_ms: 0,
        }
    }

    pub fn failed(step_index: usize, error: &StepError) -> Self {
        Self {
            step_index,
            status: StepStatus::Failed,
            error_detail: Some(error.to_string()),
            selector_used: None,
            profile_field: None,
            duration_ms: 0,
        }
    }

    /// Classify a step error into the skipped or failed bucket
    pub fn from_error(step_index: usize, error: &StepError) -> Self {
        match error {
            StepError::NoProfileValue
            | StepError::Cancelled
            | StepError::Aborted
            | StepError::Unsupported => Self::skipped(step_index, error),
            StepError::SelectorNotFound | StepError::Automation(_) | StepError::Timeout => {
                Self::failed(step_index, error)
            }
        }
    }

    pub fn with_field(mut self, profile_field: Option<String>) -> Self {
        self.profile_field = profile_field;
        self
    }

    pub fn with_selector(mut self, selector: Option<String>) -> Self {
        self.selector_used = selector;
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// A step ready for replay, paired with the mapping that drives it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub index: usize,
    pub step: Step,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<FieldMapping>,
}

/// One form-fill attempt. Lives only for the duration of a replay call.
pub struct ReplaySession {
    pub id: String,
    pub origin: String,
    pub steps: Vec<PlannedStep>,
    pub profile: Arc<Profile>,
    pub extensions: ExtensionPipeline,
    pub state: ReplayState,
    pub results: Vec<StepOutcome>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReplaySession {
    pub fn new(
        id: String,
        origin: String,
        steps: Vec<PlannedStep>,
        profile: Arc<Profile>,
        extensions: ExtensionPipeline,
    ) -> Self {
        Self {
            id,
            origin,
            steps,
            profile,
            extensions,
            state: ReplayState::Idle,
            results: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn transition(&mut self, next: ReplayState) {
        tracing::debug!("Replay {} state {:?} -> {:?}", self.id, self.state, next);
        if next == ReplayState::Initializing {
            self.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.state = next;
    }

    pub fn record(&mut self, outcome: StepOutcome) {
        self.results.push(outcome);
    }

    /// Mark every step without a result as skipped for the given reason
    pub fn skip_remaining(&mut self, reason: &StepError) {
        let done = self.results.len();
        for planned in self.steps.iter().skip(done) {
            self.results.push(StepOutcome::skipped(planned.index, reason));
        }
    }

    /// Consume the session, keeping only what the caller gets back
    pub fn into_report(self, error: Option<SessionError>) -> ReplayReport {
        let summary = ReplaySummary::from_results(&self.results, &self.steps);
        let extension_stats = self.extensions.stats();
        ReplayReport {
            session_id: self.id,
            origin: self.origin,
            state: self.state,
            results: self.results,
            summary,
            error: error.map(|e| e.to_string()),
            extension_stats,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Change steps that received a value
    pub fields_filled: usize,
    /// Change steps attempted or skipped
    pub fields_total: usize,
}

impl ReplaySummary {
    pub fn from_results(results: &[StepOutcome], steps: &[PlannedStep]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Default::default()
        };
        for outcome in results {
            match outcome.status {
                StepStatus::Success => summary.succeeded += 1,
                StepStatus::Skipped => summary.skipped += 1,
                StepStatus::Failed => summary.failed += 1,
            }

            let is_field = steps
                .iter()
                .find(|p| p.index == outcome.step_index)
                .is_some_and(|p| p.step.kind == StepKind::Change);
            if is_field {
                summary.fields_total += 1;
                if outcome.is_success() {
                    summary.fields_filled += 1;
                }
            }
        }
        summary
    }
}

/// What a replay returns to its caller: the full per-step log, even on abort
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub session_id: String,
    pub origin: String,
    pub state: ReplayState,
    pub results: Vec<StepOutcome>,
    pub summary: ReplaySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extension_stats: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReplayReport {
    pub fn count(&self, status: StepStatus, detail: &str) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == status && r.error_detail.as_deref() == Some(detail))
            .count()
    }
}
