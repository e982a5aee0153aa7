use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::mapping::MappingSet;
use super::profile::Profile;
use crate::config::ReplayOptions;
use crate::replay::Pacing;

/// Train mappings from a recorder export
#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    /// The raw recorder JSON, passed through untouched
    pub recording: Value,
    /// Used as the origin when the recording never navigates
    pub url: Option<String>,
    /// Probe the live page for fill strategies before storing
    #[serde(default)]
    pub analyze: bool,
    pub headless: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    /// Page to probe; defaults to the set's source URL
    pub url: Option<String>,
    pub headless: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub field: String,
}

/// Fill a form with a profile.
///
/// Either `origin` (stored mappings) or `mappings` (a transient set, e.g.
/// produced by an external analyzer) must be given. With a `recording` the
/// replay follows it step for step; without one every mapped field is filled.
#[derive(Debug, Deserialize)]
pub struct ReplayRequest {
    pub origin: Option<String>,
    pub mappings: Option<MappingSet>,
    pub recording: Option<Value>,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub options: ReplayOptionsRequest,
    #[serde(default)]
    pub extensions: ExtensionsRequest,
    pub headless: Option<bool>,
    /// Block until the replay finishes (default) or return its id at once
    #[serde(default = "default_true")]
    pub wait: bool,
}

fn default_true() -> bool {
    true
}

/// Per-request overrides of the configured replay timing
#[derive(Debug, Default, Deserialize)]
pub struct ReplayOptionsRequest {
    pub element_timeout_ms: Option<u64>,
    pub action_timeout_ms: Option<u64>,
    pub char_delay_ms: Option<u64>,
    /// `false` disables the settle delay between steps
    pub pacing: Option<bool>,
    pub enforce_origin: Option<bool>,
}

impl ReplayOptionsRequest {
    pub fn apply(&self, mut options: ReplayOptions) -> ReplayOptions {
        if let Some(ms) = self.element_timeout_ms {
            options.element_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.action_timeout_ms {
            options.action_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.char_delay_ms {
            options.char_delay = Duration::from_millis(ms);
        }
        if self.pacing == Some(false) {
            options.pacing = Pacing::none();
        }
        if let Some(enforce) = self.enforce_origin {
            options.enforce_origin = enforce;
        }
        options
    }
}

/// Which built-in extensions to attach to a replay
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExtensionsRequest {
    pub verbose: bool,
    pub screenshots: bool,
    pub screenshot_successes: bool,
    pub human_pacing: bool,
    pub dismiss_popups: bool,
    pub captcha: bool,
}

impl Default for ExtensionsRequest {
    fn default() -> Self {
        Self {
            verbose: false,
            screenshots: false,
            screenshot_successes: false,
            human_pacing: false,
            dismiss_popups: true,
            captcha: true,
        }
    }
}
