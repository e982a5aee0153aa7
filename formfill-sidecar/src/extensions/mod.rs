//! Replay lifecycle hooks.
//!
//! An extension implements any subset of four call points. The pipeline runs
//! every point in registration order and isolates failures: a hook that
//! errors or panics is logged and skipped, and the replay carries on.

pub mod captcha;
pub mod logging;
pub mod pacing;
pub mod popup;
pub mod screenshot;

pub use captcha::{CaptchaChallenge, CaptchaExtension, CaptchaResolver, SignalResolver};
pub use logging::LoggingExtension;
pub use pacing::HumanPacingExtension;
pub use popup::PopupDismissExtension;
pub use screenshot::ScreenshotExtension;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::browser::PageDriver;
use crate::models::{PlannedStep, Profile, ReplayState, StepOutcome};

/// What hooks can see and touch during a replay
pub struct ReplayContext {
    pub session_id: String,
    pub origin: String,
    pub profile: Arc<Profile>,
    pub driver: Arc<dyn PageDriver>,
    /// Lifecycle state of the replay; `Initializing` during `before_all_steps`
    pub state: ReplayState,
    /// Free-form data extensions can share across call points
    pub scratch: HashMap<String, Value>,
}

impl ReplayContext {
    pub fn new(session_id: &str, origin: &str, profile: Arc<Profile>, driver: Arc<dyn PageDriver>) -> Self {
        Self {
            session_id: session_id.to_string(),
            origin: origin.to_string(),
            profile,
            driver,
            state: ReplayState::Initializing,
            scratch: HashMap::new(),
        }
    }
}

#[async_trait]
pub trait ReplayExtension: Send + Sync {
    fn name(&self) -> &str;

    async fn before_all_steps(&mut self, _ctx: &mut ReplayContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn before_each_step(&mut self, _step: &PlannedStep, _ctx: &mut ReplayContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_each_step(
        &mut self,
        _step: &PlannedStep,
        _outcome: &StepOutcome,
        _ctx: &mut ReplayContext,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_all_steps(&mut self, _results: &[StepOutcome], _ctx: &mut ReplayContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Counters reported alongside the replay result
    fn stats(&self) -> Option<Value> {
        None
    }
}

#[derive(Default)]
pub struct ExtensionPipeline {
    extensions: Vec<Box<dyn ReplayExtension>>,
}

impl ExtensionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: ReplayExtension + 'static>(&mut self, extension: E) {
        self.extensions.push(Box::new(extension));
    }

    pub fn with<E: ReplayExtension + 'static>(mut self, extension: E) -> Self {
        self.register(extension);
        self
    }

    pub fn push_boxed(&mut self, extension: Box<dyn ReplayExtension>) {
        self.extensions.push(extension);
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.extensions.iter().map(|e| e.name().to_string()).collect()
    }

    pub async fn before_all_steps(&mut self, ctx: &mut ReplayContext) {
        for ext in self.extensions.iter_mut() {
            let result = AssertUnwindSafe(ext.before_all_steps(ctx)).catch_unwind().await;
            report(ext.name(), "before_all_steps", result);
        }
    }

    pub async fn before_each_step(&mut self, step: &PlannedStep, ctx: &mut ReplayContext) {
        for ext in self.extensions.iter_mut() {
            let result = AssertUnwindSafe(ext.before_each_step(step, ctx)).catch_unwind().await;
            report(ext.name(), "before_each_step", result);
        }
    }

    pub async fn after_each_step(&mut self, step: &PlannedStep, outcome: &StepOutcome, ctx: &mut ReplayContext) {
        for ext in self.extensions.iter_mut() {
            let result = AssertUnwindSafe(ext.after_each_step(step, outcome, ctx))
                .catch_unwind()
                .await;
            report(ext.name(), "after_each_step", result);
        }
    }

    pub async fn after_all_steps(&mut self, results: &[StepOutcome], ctx: &mut ReplayContext) {
        for ext in self.extensions.iter_mut() {
            let result = AssertUnwindSafe(ext.after_all_steps(results, ctx)).catch_unwind().await;
            report(ext.name(), "after_all_steps", result);
        }
    }

    /// Stats of every extension that reports any, keyed by name
    pub fn stats(&self) -> BTreeMap<String, Value> {
        self.extensions
            .iter()
            .filter_map(|e| e.stats().map(|s| (e.name().to_string(), s)))
            .collect()
    }
}

fn report(name: &str, point: &str, result: std::thread::Result<anyhow::Result<()>>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Extension {} failed in {}: {:#}", name, point, e),
        Err(_) => tracing::error!("Extension {} panicked in {}", name, point),
    }
}
