use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Kind of a recorded browser action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Navigate,
    Change,
    Click,
    KeyEvent,
    SetViewport,
    /// A step type the normalizer does not know. Kept in sequence, never replayed.
    Unsupported(String),
}

impl StepKind {
    /// Whether steps of this kind act on a DOM node
    pub fn targets_element(&self) -> bool {
        matches!(self, StepKind::Change | StepKind::Click)
    }

    pub fn as_str(&self) -> &str {
        match self {
            StepKind::Navigate => "navigate",
            StepKind::Change => "change",
            StepKind::Click => "click",
            StepKind::KeyEvent => "key_event",
            StepKind::SetViewport => "set_viewport",
            StepKind::Unsupported(kind) => kind.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: i32,
    pub height: i32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// One recorded browser action in canonical form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub kind: StepKind,
    /// Groups of equivalent selectors, most specific group first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selectors: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            selectors: Vec::new(),
            value: None,
            target_url: None,
            viewport: None,
        }
    }

    pub fn navigate(url: &str) -> Self {
        Self {
            target_url: Some(url.to_string()),
            ..Self::new(StepKind::Navigate)
        }
    }

    pub fn change(selectors: Vec<Vec<String>>, value: Option<String>) -> Self {
        Self {
            selectors,
            value,
            ..Self::new(StepKind::Change)
        }
    }

    /// All selector candidates flattened in recorded priority order
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        self.selectors.iter().flatten().map(String::as_str)
    }

    /// Render the step back into the recorder export shape
    pub fn to_export(&self) -> Value {
        let mut obj = Map::new();
        let step_type = match &self.kind {
            StepKind::Navigate => "navigate",
            StepKind::Change => "change",
            StepKind::Click => "click",
            StepKind::KeyEvent => "keyDown",
            StepKind::SetViewport => "setViewport",
            StepKind::Unsupported(kind) => kind.as_str(),
        };
        obj.insert("type".to_string(), json!(step_type));

        if !self.selectors.is_empty() {
            obj.insert("selectors".to_string(), json!(self.selectors));
        }
        if let Some(value) = &self.value {
            let key = if self.kind == StepKind::KeyEvent { "key" } else { "value" };
            obj.insert(key.to_string(), json!(value));
        }
        if let Some(url) = &self.target_url {
            obj.insert("url".to_string(), json!(url));
        }
        if let Some(viewport) = &self.viewport {
            obj.insert("width".to_string(), json!(viewport.width));
            obj.insert("height".to_string(), json!(viewport.height));
        }

        Value::Object(obj)
    }
}

/// A normalized recording: ordered canonical steps plus where it was captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub steps: Vec<Step>,
}

impl Recording {
    pub fn change_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.kind == StepKind::Change)
    }

    /// Render the recording back into the recorder export shape
    pub fn to_export(&self) -> Value {
        let mut steps: Vec<Value> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            steps.push(step.to_export());
            // Key presses were folded from keyDown/keyUp pairs
            if step.kind == StepKind::KeyEvent {
                if let Some(key) = &step.value {
                    steps.push(json!({ "type": "keyUp", "key": key }));
                }
            }
        }

        let mut obj = Map::new();
        if let Some(title) = &self.title {
            obj.insert("title".to_string(), json!(title));
        }
        obj.insert("steps".to_string(), Value::Array(steps));
        Value::Object(obj)
    }
}
