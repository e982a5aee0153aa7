use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ReplayContext, ReplayExtension};
use crate::models::PlannedStep;

/// Cookie banners and modal close buttons seen on common sites
pub const DEFAULT_POPUP_SELECTORS: &[&str] = &[
    "#onetrust-accept-btn-handler",
    "[data-testid=\"cookie-policy-dialog-accept-button\"]",
    ".cookie-accept",
    "#accept-cookies",
    "#cookie-accept",
    "button[aria-label=\"Close\"]",
    "button[aria-label=\"close\"]",
    "[data-dismiss=\"modal\"]",
    ".modal-close",
    ".popup-close",
    ".btn-close",
    ".cookie-close",
];

/// Clicks away overlays before each step so they do not swallow input
#[derive(Debug)]
pub struct PopupDismissExtension {
    selectors: Vec<String>,
    settle: Duration,
    dismissed: usize,
}

impl PopupDismissExtension {
    pub fn new(selectors: Vec<String>) -> Self {
        Self {
            selectors,
            settle: Duration::from_millis(300),
            dismissed: 0,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn dismissed(&self) -> usize {
        self.dismissed
    }

    async fn sweep(&mut self, ctx: &ReplayContext) -> anyhow::Result<()> {
        for selector in &self.selectors {
            if !ctx.driver.exists(selector).await? {
                continue;
            }
            // A banner can vanish between the probe and the click
            match ctx.driver.click(selector).await {
                Ok(()) => {
                    self.dismissed += 1;
                    tracing::debug!("Dismissed popup via {}", selector);
                    tokio::time::sleep(self.settle).await;
                }
                Err(e) => tracing::debug!("Popup {} not dismissed: {}", selector, e),
            }
        }
        Ok(())
    }
}

impl Default for PopupDismissExtension {
    fn default() -> Self {
        Self::new(DEFAULT_POPUP_SELECTORS.iter().map(|s| s.to_string()).collect())
    }
}

#[async_trait]
impl ReplayExtension for PopupDismissExtension {
    fn name(&self) -> &str {
        "popup_dismiss"
    }

    async fn before_each_step(&mut self, step: &PlannedStep, ctx: &mut ReplayContext) -> anyhow::Result<()> {
        if !step.step.kind.targets_element() {
            return Ok(());
        }
        self.sweep(ctx).await
    }

    fn stats(&self) -> Option<Value> {
        Some(json!({ "dismissed": self.dismissed }))
    }
}
