use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ReplayContext, ReplayExtension};
use crate::models::{PlannedStep, StepKind};

/// Random think-time before each interactive step
#[derive(Debug)]
pub struct HumanPacingExtension {
    min: Duration,
    max: Duration,
    total_waited: Duration,
}

impl HumanPacingExtension {
    pub fn new(min: Duration, max: Duration) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            total_waited: Duration::ZERO,
        }
    }

    fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let ms = rand::thread_rng().gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(ms as u64)
    }
}

impl Default for HumanPacingExtension {
    fn default() -> Self {
        Self::new(Duration::from_millis(150), Duration::from_millis(600))
    }
}

#[async_trait]
impl ReplayExtension for HumanPacingExtension {
    fn name(&self) -> &str {
        "human_pacing"
    }

    async fn before_each_step(&mut self, step: &PlannedStep, _ctx: &mut ReplayContext) -> anyhow::Result<()> {
        if !matches!(step.step.kind, StepKind::Change | StepKind::Click | StepKind::KeyEvent) {
            return Ok(());
        }
        let delay = self.next_delay();
        self.total_waited += delay;
        tokio::time::sleep(delay).await;
        Ok(())
    }

    fn stats(&self) -> Option<Value> {
        Some(json!({ "total_waited_ms": self.total_waited.as_millis() as u64 }))
    }
}
