use serde::{Deserialize, Serialize};

use crate::models::{normalize_origin, MappingSet, PlannedStep, Recording, Step, StepKind};

/// Sets handed in from outside the store may carry a URL or mixed-case host
fn origin_key(set: &MappingSet) -> String {
    normalize_origin(&set.origin).unwrap_or_else(|| set.origin.to_lowercase())
}

/// An ordered list of steps to replay against one origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayPlan {
    pub origin: String,
    pub source_url: String,
    pub steps: Vec<PlannedStep>,
}

impl ReplayPlan {
    /// Replay a recording step for step, pairing each Change with its mapping
    pub fn from_recording(recording: &Recording, set: &MappingSet) -> Self {
        let steps = recording
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let mapping = if step.kind == StepKind::Change {
                    set.find_for_candidates(step.candidates()).cloned()
                } else {
                    None
                };
                PlannedStep {
                    index,
                    step: step.clone(),
                    mapping,
                }
            })
            .collect();

        Self {
            origin: origin_key(set),
            source_url: recording.source_url.clone().unwrap_or_else(|| set.source_url.clone()),
            steps,
        }
    }

    /// Fill every mapped field of a set without a recording: open the
    /// trained page, then one Change per mapping in stored order.
    pub fn from_mappings(set: &MappingSet) -> Self {
        let mut steps = vec![PlannedStep {
            index: 0,
            step: Step::navigate(&set.source_url),
            mapping: None,
        }];

        for mapping in &set.mappings {
            let selectors = vec![mapping.selector_chain().map(str::to_string).collect()];
            steps.push(PlannedStep {
                index: steps.len(),
                step: Step::change(selectors, None),
                mapping: Some(mapping.clone()),
            });
        }

        Self {
            origin: origin_key(set),
            source_url: set.source_url.clone(),
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of Change steps with a mapped profile field
    pub fn mapped_fields(&self) -> usize {
        self.steps
            .iter()
            .filter(|p| p.mapping.as_ref().is_some_and(|m| m.is_mapped()))
            .count()
    }
}
