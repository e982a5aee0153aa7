use async_trait::async_trait;

use super::{ReplayContext, ReplayExtension};
use crate::models::{PlannedStep, StepOutcome, StepStatus};

/// Traces replay progress: session start, each step result and a final tally
#[derive(Debug, Default)]
pub struct LoggingExtension {
    verbose: bool,
}

impl LoggingExtension {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

#[async_trait]
impl ReplayExtension for LoggingExtension {
    fn name(&self) -> &str {
        "logging"
    }

    async fn before_all_steps(&mut self, ctx: &mut ReplayContext) -> anyhow::Result<()> {
        tracing::info!(
            "Starting replay {} on {} with {} profile fields",
            ctx.session_id,
            ctx.origin,
            ctx.profile.len()
        );
        Ok(())
    }

    async fn before_each_step(&mut self, step: &PlannedStep, _ctx: &mut ReplayContext) -> anyhow::Result<()> {
        if self.verbose {
            let field = step.mapping.as_ref().and_then(|m| m.profile_field.as_deref());
            tracing::info!(
                ">> Step {} ({}) field={} selector={}",
                step.index,
                step.step.kind.as_str(),
                field.unwrap_or("-"),
                step.mapping.as_ref().map(|m| m.selector.as_str()).unwrap_or("-")
            );
        }
        Ok(())
    }

    async fn after_each_step(
        &mut self,
        step: &PlannedStep,
        outcome: &StepOutcome,
        _ctx: &mut ReplayContext,
    ) -> anyhow::Result<()> {
        let field = outcome.profile_field.as_deref().unwrap_or(step.step.kind.as_str());
        match outcome.status {
            StepStatus::Success => tracing::info!("[OK] {}: {}ms", field, outcome.duration_ms),
            _ => tracing::info!(
                "[FAIL] {}: {}",
                field,
                outcome.error_detail.as_deref().unwrap_or("unknown error")
            ),
        }
        Ok(())
    }

    async fn after_all_steps(&mut self, results: &[StepOutcome], ctx: &mut ReplayContext) -> anyhow::Result<()> {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let total_ms: u64 = results.iter().map(|r| r.duration_ms).sum();
        tracing::info!(
            "Replay {} complete: {}/{} steps successful, {}ms total",
            ctx.session_id,
            succeeded,
            results.len(),
            total_ms
        );
        Ok(())
    }
}
