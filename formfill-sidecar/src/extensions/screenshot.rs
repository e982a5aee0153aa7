use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::path::PathBuf;

use super::{ReplayContext, ReplayExtension};
use crate::models::{PlannedStep, StepOutcome, StepStatus};

/// Saves a PNG after steps that failed (and optionally after ones that succeeded)
#[derive(Debug)]
pub struct ScreenshotExtension {
    dir: PathBuf,
    on_error: bool,
    on_success: bool,
    saved: Vec<PathBuf>,
}

impl ScreenshotExtension {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            on_error: true,
            on_success: false,
            saved: Vec::new(),
        }
    }

    pub fn on_success(mut self, enabled: bool) -> Self {
        self.on_success = enabled;
        self
    }

    pub fn on_error(mut self, enabled: bool) -> Self {
        self.on_error = enabled;
        self
    }

    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }

    fn should_capture(&self, outcome: &StepOutcome) -> bool {
        match outcome.status {
            StepStatus::Success => self.on_success,
            StepStatus::Failed => self.on_error,
            StepStatus::Skipped => false,
        }
    }
}

fn file_safe(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[async_trait]
impl ReplayExtension for ScreenshotExtension {
    fn name(&self) -> &str {
        "screenshot"
    }

    async fn before_all_steps(&mut self, _ctx: &mut ReplayContext) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create screenshot directory {}", self.dir.display()))
    }

    async fn after_each_step(
        &mut self,
        step: &PlannedStep,
        outcome: &StepOutcome,
        ctx: &mut ReplayContext,
    ) -> anyhow::Result<()> {
        if !self.should_capture(outcome) {
            return Ok(());
        }

        let label = outcome.profile_field.as_deref().unwrap_or(step.step.kind.as_str());
        let status = if outcome.is_success() { "success" } else { "error" };
        let filename = format!(
            "{}_{:03}_{}_{}_{}.png",
            file_safe(&ctx.session_id),
            step.index,
            file_safe(label),
            status,
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.dir.join(filename);

        let png = ctx.driver.screenshot().await?;
        tokio::fs::write(&path, png)
            .await
            .with_context(|| format!("Failed to write screenshot {}", path.display()))?;

        tracing::debug!("Screenshot saved: {}", path.display());
        self.saved.push(path);
        Ok(())
    }

    fn stats(&self) -> Option<Value> {
        Some(json!({
            "saved": self.saved.len(),
            "files": self.saved.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        }))
    }
}
