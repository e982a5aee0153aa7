use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use super::{ReplayContext, ReplayExtension};
use crate::browser::PageDriver;
use crate::models::{PlannedStep, StepKind, StepOutcome};

/// Selector -> challenge kind, most specific first
const CAPTCHA_SIGNATURES: &[(&str, &str)] = &[
    ("iframe[src*='recaptcha/api2']", "recaptcha_v2"),
    ("iframe[src*='recaptcha/enterprise']", "recaptcha_enterprise"),
    ("iframe[src*='hcaptcha']", "hcaptcha"),
    ("iframe[src*='recaptcha']", "recaptcha"),
    ("[class*='g-recaptcha']", "recaptcha"),
    ("[class*='h-captcha']", "hcaptcha"),
    ("#recaptcha", "recaptcha"),
    (".captcha-container", "generic"),
];

#[derive(Debug, Clone, Serialize)]
pub struct CaptchaChallenge {
    pub session_id: String,
    pub origin: String,
    pub kind: String,
    pub selector: String,
}

/// Something outside the replay that can clear a challenge (a person, a service).
///
/// `resolve` returns once the challenge is believed solved; `false` means give up.
#[async_trait]
pub trait CaptchaResolver: Send + Sync {
    async fn resolve(&self, challenge: &CaptchaChallenge) -> bool;
}

/// Resolver completed by an external signal, e.g. an HTTP call from the UI
#[derive(Debug, Default, Clone)]
pub struct SignalResolver {
    notify: Arc<Notify>,
}

impl SignalResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the pending (or next) challenge as solved
    pub fn signal(&self) {
        self.notify.notify_one();
    }
}

#[async_trait]
impl CaptchaResolver for SignalResolver {
    async fn resolve(&self, challenge: &CaptchaChallenge) -> bool {
        tracing::info!(
            "Waiting for external CAPTCHA resolution ({}) on {}",
            challenge.kind,
            challenge.origin
        );
        self.notify.notified().await;
        true
    }
}

#[derive(Debug, Default, Clone, Serialize)]
struct CaptchaStats {
    detected: usize,
    solved: usize,
    failed: usize,
    manual_interventions: usize,
    kinds: Vec<String>,
    solve_times_ms: Vec<u64>,
}

/// Detects CAPTCHA widgets and holds the replay until they are cleared.
///
/// Checks run before every Click step (submit buttons are where challenges
/// block) and once more after the last step. Without a resolver the extension
/// polls the page until the widget disappears, giving a person at a headed
/// browser time to solve it.
pub struct CaptchaExtension {
    resolver: Option<Arc<dyn CaptchaResolver>>,
    max_wait: Duration,
    poll_interval: Duration,
    stats: CaptchaStats,
}

impl CaptchaExtension {
    pub fn new() -> Self {
        Self {
            resolver: None,
            max_wait: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            stats: CaptchaStats::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn CaptchaResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn detect(driver: &dyn PageDriver) -> anyhow::Result<Option<(&'static str, &'static str)>> {
        for (selector, kind) in CAPTCHA_SIGNATURES {
            if driver.exists(selector).await? {
                return Ok(Some((*selector, *kind)));
            }
        }
        Ok(None)
    }

    async fn wait_until_cleared(&self, driver: &dyn PageDriver) -> anyhow::Result<bool> {
        let deadline = Instant::now() + self.max_wait;
        while Instant::now() < deadline {
            tokio::time::sleep(self.poll_interval).await;
            if Self::detect(driver).await?.is_none() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn check(&mut self, ctx: &ReplayContext) -> anyhow::Result<()> {
        let Some((selector, kind)) = Self::detect(ctx.driver.as_ref()).await? else {
            return Ok(());
        };

        tracing::warn!("CAPTCHA detected on {}: {}", ctx.origin, kind);
        self.stats.detected += 1;
        self.stats.kinds.push(kind.to_string());
        let started = Instant::now();

        let solved = match &self.resolver {
            Some(resolver) => {
                let challenge = CaptchaChallenge {
                    session_id: ctx.session_id.clone(),
                    origin: ctx.origin.clone(),
                    kind: kind.to_string(),
                    selector: selector.to_string(),
                };
                tokio::time::timeout(self.max_wait, resolver.resolve(&challenge))
                    .await
                    .unwrap_or(false)
            }
            None => {
                self.stats.manual_interventions += 1;
                self.wait_until_cleared(ctx.driver.as_ref()).await?
            }
        };

        if solved {
            self.stats.solved += 1;
            self.stats.solve_times_ms.push(started.elapsed().as_millis() as u64);
            tracing::info!("CAPTCHA cleared after {}ms", started.elapsed().as_millis());
        } else {
            self.stats.failed += 1;
            tracing::warn!("CAPTCHA not cleared within {}s, continuing", self.max_wait.as_secs());
        }
        Ok(())
    }
}

impl Default for CaptchaExtension {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplayExtension for CaptchaExtension {
    fn name(&self) -> &str {
        "captcha"
    }

    async fn before_each_step(&mut self, step: &PlannedStep, ctx: &mut ReplayContext) -> anyhow::Result<()> {
        if step.step.kind != StepKind::Click {
            return Ok(());
        }
        self.check(ctx).await
    }

    async fn after_all_steps(&mut self, _results: &[StepOutcome], ctx: &mut ReplayContext) -> anyhow::Result<()> {
        self.check(ctx).await
    }

    fn stats(&self) -> Option<Value> {
        let mut stats = serde_json::to_value(&self.stats).ok()?;
        let success_rate = if self.stats.detected > 0 {
            self.stats.solved as f64 / self.stats.detected as f64 * 100.0
        } else {
            0.0
        };
        stats["success_rate"] = json!(success_rate);
        Some(stats)
    }
}
