use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::TrainingError;
use crate::models::{Recording, Step, StepKind, Viewport};

/// Parse recorder export JSON text into a normalized recording
pub fn normalize_str(text: &str) -> Result<Recording, TrainingError> {
    let raw: Value = serde_json::from_str(text)
        .map_err(|e| TrainingError::InvalidExport(format!("not valid JSON: {}", e)))?;
    normalize(&raw)
}

/// Normalize a recorder export into canonical steps.
///
/// Accepts either `{ "title": .., "steps": [..] }` or a bare array of steps.
/// Unknown step types are kept as [`StepKind::Unsupported`] so a partially
/// understood recording still trains; only structurally broken input fails.
pub fn normalize(raw: &Value) -> Result<Recording, TrainingError> {
    let (title, raw_steps) = match raw {
        Value::Object(obj) => {
            let steps = obj
                .get("steps")
                .and_then(Value::as_array)
                .ok_or_else(|| TrainingError::InvalidExport("missing `steps` array".to_string()))?;
            let title = obj.get("title").and_then(Value::as_str).map(str::to_string);
            (title, steps)
        }
        Value::Array(steps) => (None, steps),
        _ => {
            return Err(TrainingError::InvalidExport(
                "expected an object with a `steps` array".to_string(),
            ))
        }
    };

    let mut steps: Vec<Step> = Vec::with_capacity(raw_steps.len());
    let mut source_url: Option<String> = None;

    for (index, raw_step) in raw_steps.iter().enumerate() {
        let obj = raw_step.as_object().ok_or_else(|| TrainingError::MalformedRecording {
            index,
            detail: "step is not an object".to_string(),
        })?;
        let step_type = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| TrainingError::MalformedRecording {
                index,
                detail: "step has no `type`".to_string(),
            })?;

        if source_url.is_none() {
            source_url = asserted_url(obj);
        }

        // A key release directly after its press adds nothing to replay
        if step_type == "keyUp" {
            let key = string_field(obj, "key");
            let folded = steps
                .last()
                .is_some_and(|prev| prev.kind == StepKind::KeyEvent && prev.value == key);
            if folded {
                continue;
            }
        }

        let step = normalize_step(step_type, obj);
        if step.kind == StepKind::Navigate {
            if let Some(url) = &step.target_url {
                if steps.iter().all(|s| s.kind != StepKind::Navigate) {
                    source_url = Some(url.clone());
                }
            }
        }
        steps.push(step);
    }

    tracing::debug!(
        "Normalized {} raw steps into {} steps ({} unsupported)",
        raw_steps.len(),
        steps.len(),
        steps
            .iter()
            .filter(|s| matches!(s.kind, StepKind::Unsupported(_)))
            .count()
    );

    Ok(Recording {
        title,
        source_url,
        steps,
    })
}

fn normalize_step(step_type: &str, obj: &Map<String, Value>) -> Step {
    let selectors = obj.get("selectors").map(parse_selector_groups).unwrap_or_default();

    let mut step = match step_type {
        "navigate" => match string_field(obj, "url") {
            Some(url) => Step::navigate(&url),
            None => Step::new(StepKind::Unsupported(step_type.to_string())),
        },
        "change" => Step {
            selectors,
            value: string_field(obj, "value"),
            ..Step::new(StepKind::Change)
        },
        "click" | "doubleClick" => Step {
            selectors,
            ..Step::new(StepKind::Click)
        },
        "keyDown" => match string_field(obj, "key") {
            Some(key) => Step {
                value: Some(key),
                ..Step::new(StepKind::KeyEvent)
            },
            None => Step::new(StepKind::Unsupported(step_type.to_string())),
        },
        "setViewport" => {
            let default = Viewport::default();
            let dimension = |key: &str, fallback: i32| {
                obj.get(key)
                    .and_then(Value::as_i64)
                    .and_then(|v| i32::try_from(v).ok())
                    .unwrap_or(fallback)
            };
            Step {
                viewport: Some(Viewport {
                    width: dimension("width", default.width),
                    height: dimension("height", default.height),
                }),
                ..Step::new(StepKind::SetViewport)
            }
        }
        other => Step {
            selectors,
            value: string_field(obj, "value"),
            ..Step::new(StepKind::Unsupported(other.to_string()))
        },
    };

    if step.kind.targets_element() && step.selectors.is_empty() {
        tracing::warn!("Recorded {} step has no selectors, keeping it as unsupported", step_type);
        step.kind = StepKind::Unsupported(step_type.to_string());
    }

    step
}

/// Flatten selector groups, dropping empty entries and selectors already seen
/// in an earlier group. Group and in-group order are preserved.
fn parse_selector_groups(raw: &Value) -> Vec<Vec<String>> {
    let groups: Vec<Vec<&str>> = match raw {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Array(group) => group.iter().filter_map(Value::as_str).collect(),
                Value::String(s) => vec![s.as_str()],
                _ => Vec::new(),
            })
            .collect(),
        Value::String(s) => vec![vec![s.as_str()]],
        _ => Vec::new(),
    };

    let mut seen: HashSet<&str> = HashSet::new();
    groups
        .into_iter()
        .map(|group| {
            group
                .into_iter()
                .map(str::trim)
                .filter(|s| !s.is_empty() && seen.insert(s))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|group| !group.is_empty())
        .collect()
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn asserted_url(obj: &Map<String, Value>) -> Option<String> {
    obj.get("assertedEvents")?
        .as_array()?
        .iter()
        .find_map(|event| event.get("url").and_then(Value::as_str))
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}
