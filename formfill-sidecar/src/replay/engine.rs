use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::timeout;
use url::Url;

use super::plan::ReplayPlan;
use super::strategies;
use crate::browser::PageDriver;
use crate::config::ReplayOptions;
use crate::error::{DriverError, SessionError, StepError};
use crate::extensions::{ExtensionPipeline, ReplayContext};
use crate::models::{
    origin_matches, FillStrategy, PlannedStep, Profile, ReplayReport, ReplaySession, ReplayState, StepKind,
    StepOutcome, StepStatus,
};

/// Progress of a running replay, as seen by subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    Started {
        session_id: String,
        origin: String,
        total_steps: usize,
    },
    Step {
        session_id: String,
        outcome: StepOutcome,
    },
    Finished {
        session_id: String,
        report: ReplayReport,
    },
}

impl ReplayEvent {
    pub fn session_id(&self) -> &str {
        match self {
            ReplayEvent::Started { session_id, .. }
            | ReplayEvent::Step { session_id, .. }
            | ReplayEvent::Finished { session_id, .. } => session_id,
        }
    }
}

/// Caller's grip on a replay: its id, a cancel switch and the event stream
#[derive(Clone)]
pub struct ReplayHandle {
    session_id: String,
    cancelled: Arc<AtomicBool>,
    events: broadcast::Sender<ReplayEvent>,
}

impl ReplayHandle {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self::with_events(events)
    }

    /// Publish this replay's events on a shared channel
    pub fn with_events(events: broadcast::Sender<ReplayEvent>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            cancelled: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Stop before the next step starts. The current step runs to completion.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplayEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ReplayEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }
}

impl Default for ReplayHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Why the step loop stopped early
enum Halt {
    Cancelled,
    Session(SessionError),
}

/// Failure while locating a step's element
enum ResolveError {
    Step(StepError),
    Lost(SessionError),
}

/// Replays planned steps against a page driver
pub struct ReplayEngine {
    driver: Arc<dyn PageDriver>,
    options: ReplayOptions,
}

impl ReplayEngine {
    pub fn new(driver: Arc<dyn PageDriver>, options: ReplayOptions) -> Self {
        Self { driver, options }
    }

    /// Run a plan to the end, or until cancelled or the session breaks.
    ///
    /// Never fails: every outcome, including launch failures, is reported in
    /// the returned `ReplayReport` with one result per planned step.
    pub async fn run(
        &self,
        plan: ReplayPlan,
        profile: Arc<Profile>,
        extensions: ExtensionPipeline,
        handle: &ReplayHandle,
    ) -> ReplayReport {
        let mut session = ReplaySession::new(
            handle.session_id().to_string(),
            plan.origin,
            plan.steps,
            profile,
            extensions,
        );

        handle.emit(ReplayEvent::Started {
            session_id: session.id.clone(),
            origin: session.origin.clone(),
            total_steps: session.steps.len(),
        });

        session.transition(ReplayState::Initializing);
        if let Err(e) = self.driver.open().await {
            tracing::error!("Replay {} could not open a browser: {}", session.id, e);
            session.skip_remaining(&StepError::Aborted);
            session.transition(ReplayState::Aborted);
            return self.finish(session, Some(SessionError::BrowserLaunch(e.to_string())), handle);
        }

        let mut ctx = ReplayContext::new(
            &session.id,
            &session.origin,
            Arc::clone(&session.profile),
            Arc::clone(&self.driver),
        );

        // Setup hooks run while the session is still initializing
        session.extensions.before_all_steps(&mut ctx).await;
        session.transition(ReplayState::Running);
        ctx.state = ReplayState::Running;

        let halt = self.run_steps(&mut session, &mut ctx, handle).await.err();

        session.extensions.after_all_steps(&session.results, &mut ctx).await;

        if let Err(e) = self.driver.close().await {
            tracing::warn!("Failed to close browser for replay {}: {}", session.id, e);
        }

        let error = match halt {
            None => {
                session.transition(ReplayState::Completed);
                None
            }
            Some(Halt::Cancelled) => {
                session.transition(ReplayState::Aborted);
                None
            }
            Some(Halt::Session(e)) => {
                session.transition(ReplayState::Aborted);
                Some(e)
            }
        };

        self.finish(session, error, handle)
    }

    fn finish(&self, session: ReplaySession, error: Option<SessionError>, handle: &ReplayHandle) -> ReplayReport {
        let report = session.into_report(error);
        tracing::info!(
            "Replay {} {:?}: {}/{} fields filled, {} failed, {} skipped",
            report.session_id,
            report.state,
            report.summary.fields_filled,
            report.summary.fields_total,
            report.summary.failed,
            report.summary.skipped
        );
        handle.emit(ReplayEvent::Finished {
            session_id: report.session_id.clone(),
            report: report.clone(),
        });
        report
    }

    async fn run_steps(
        &self,
        session: &mut ReplaySession,
        ctx: &mut ReplayContext,
        handle: &ReplayHandle,
    ) -> Result<(), Halt> {
        let steps = session.steps.clone();

        for planned in &steps {
            if handle.is_cancelled() {
                tracing::info!("Replay {} cancelled before step {}", session.id, planned.index);
                session.skip_remaining(&StepError::Cancelled);
                return Err(Halt::Cancelled);
            }

            let (outcome, session_error) = self.execute_step(planned, session, ctx).await;
            let executed = outcome.status != StepStatus::Skipped;

            handle.emit(ReplayEvent::Step {
                session_id: session.id.clone(),
                outcome: outcome.clone(),
            });
            session.record(outcome);

            if let Some(e) = session_error {
                tracing::error!("Replay {} aborted at step {}: {}", session.id, planned.index, e);
                session.skip_remaining(&StepError::Aborted);
                return Err(Halt::Session(e));
            }

            if executed {
                let delay = self.options.pacing.delay_for(&planned.step.kind);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Ok(())
    }

    /// Run one step through resolution, substitution, hooks and its action.
    ///
    /// Returns the step's outcome and, when the step broke the session, the
    /// error that must abort the replay.
    async fn execute_step(
        &self,
        planned: &PlannedStep,
        session: &mut ReplaySession,
        ctx: &mut ReplayContext,
    ) -> (StepOutcome, Option<SessionError>) {
        let index = planned.index;
        let kind = &planned.step.kind;
        let field = planned.mapping.as_ref().and_then(|m| m.profile_field.clone());

        if let StepKind::Unsupported(step_type) = kind {
            tracing::debug!("Skipping unsupported step {} ({})", index, step_type);
            return (StepOutcome::skipped(index, &StepError::Unsupported), None);
        }

        let started = Instant::now();
        let elapsed = || started.elapsed().as_millis() as u64;

        let selector = if kind.targets_element() {
            match self.resolve(planned).await {
                Ok(selector) => Some(selector),
                Err(ResolveError::Step(e)) => {
                    let outcome = StepOutcome::from_error(index, &e).with_field(field).with_duration(elapsed());
                    return (outcome, None);
                }
                Err(ResolveError::Lost(e)) => {
                    let outcome = StepOutcome::failed(index, &StepError::Automation(e.to_string()))
                        .with_field(field)
                        .with_duration(elapsed());
                    return (outcome, Some(e));
                }
            }
        } else {
            None
        };

        let value = if *kind == StepKind::Change {
            match field.as_deref().and_then(|f| session.profile.lookup(f)) {
                Some(value) => Some(value.to_string()),
                None => {
                    let outcome = StepOutcome::skipped(index, &StepError::NoProfileValue)
                        .with_field(field)
                        .with_selector(selector);
                    return (outcome, None);
                }
            }
        } else {
            None
        };

        session.extensions.before_each_step(planned, ctx).await;

        let action = self.perform(planned, selector.as_deref(), value.as_deref());
        let result = match timeout(self.options.action_timeout, action).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Step(StepError::Timeout)),
        };

        let mut session_error = None;
        let outcome = match result {
            Ok(()) => StepOutcome::success(index, selector.clone(), elapsed()).with_field(field),
            Err(ActionError::Step(e)) => StepOutcome::from_error(index, &e)
                .with_field(field)
                .with_selector(selector.clone())
                .with_duration(elapsed()),
            Err(ActionError::Lost(detail)) => {
                let e = SessionError::BrowserLost(detail);
                let outcome = StepOutcome::failed(index, &StepError::Automation(e.to_string()))
                    .with_field(field)
                    .with_selector(selector.clone())
                    .with_duration(elapsed());
                session_error = Some(e);
                outcome
            }
        };

        session.extensions.after_each_step(planned, &outcome, ctx).await;

        let navigates = matches!(kind, StepKind::Navigate | StepKind::Click);
        if navigates && self.options.enforce_origin && outcome.is_success() && session_error.is_none() {
            session_error = self.check_origin(&session.origin).await;
        }

        (outcome, session_error)
    }

    /// Find the first selector candidate present on the page.
    ///
    /// The mapping's chain is tried before the step's own recorded
    /// candidates. Polls until `element_timeout` runs out.
    async fn resolve(&self, planned: &PlannedStep) -> Result<String, ResolveError> {
        let mut candidates: Vec<&str> = Vec::new();
        let mapped = planned.mapping.iter().flat_map(|m| m.selector_chain());
        for candidate in mapped.chain(planned.step.candidates()) {
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        if candidates.is_empty() {
            return Err(ResolveError::Step(StepError::SelectorNotFound));
        }

        let deadline = Instant::now() + self.options.element_timeout;
        loop {
            for candidate in &candidates {
                match timeout(self.options.action_timeout, self.driver.exists(candidate)).await {
                    Ok(Ok(true)) => return Ok(candidate.to_string()),
                    Ok(Ok(false)) => {}
                    Ok(Err(DriverError::SessionLost(detail))) => {
                        return Err(ResolveError::Lost(SessionError::BrowserLost(detail)))
                    }
                    Ok(Err(e)) => tracing::debug!("Probe of {} failed: {}", candidate, e),
                    Err(_) => return Err(ResolveError::Step(StepError::Timeout)),
                }
            }
            if Instant::now() >= deadline {
                return Err(ResolveError::Step(StepError::SelectorNotFound));
            }
            tokio::time::sleep(self.options.poll_interval.min(Duration::from_secs(1))).await;
        }
    }

    async fn perform(&self, planned: &PlannedStep, selector: Option<&str>, value: Option<&str>) -> Result<(), ActionError> {
        let step = &planned.step;
        let driver = self.driver.as_ref();
        let result = match (&step.kind, selector) {
            (StepKind::Navigate, _) => match step.target_url.as_deref() {
                Some(url) => driver.navigate(url).await,
                None => Err(DriverError::Automation("Navigate step has no URL".to_string())),
            },
            (StepKind::Change, Some(selector)) => {
                let strategy = planned
                    .mapping
                    .as_ref()
                    .map(|m| m.fill_strategy)
                    .unwrap_or(FillStrategy::DirectType);
                strategies::fill(driver, selector, strategy, value.unwrap_or_default(), &self.options).await
            }
            (StepKind::Click, Some(selector)) => driver.click(selector).await,
            (StepKind::KeyEvent, _) => match step.value.as_deref() {
                Some(key) => driver.press_key(key).await,
                None => Err(DriverError::Automation("Key step has no key".to_string())),
            },
            (StepKind::SetViewport, _) => driver.set_viewport(&step.viewport.clone().unwrap_or_default()).await,
            (StepKind::Change | StepKind::Click, None) => Err(DriverError::ElementNotFound(String::new())),
            (StepKind::Unsupported(_), _) => return Err(ActionError::Step(StepError::Unsupported)),
        };

        result.map_err(|e| match e {
            DriverError::SessionLost(detail) => ActionError::Lost(detail),
            other => ActionError::Step(other.into()),
        })
    }

    /// After a navigation, make sure the page is still on the replay's origin
    async fn check_origin(&self, expected: &str) -> Option<SessionError> {
        let current = match self.driver.current_url().await {
            Ok(url) => url,
            Err(DriverError::SessionLost(detail)) => return Some(SessionError::BrowserLost(detail)),
            Err(e) => {
                tracing::debug!("Could not read current URL: {}", e);
                return None;
            }
        };

        // about:blank, data: and file: pages have no host to compare
        let host = Url::parse(&current).ok()?.host_str()?.to_lowercase();
        if origin_matches(expected, &host) {
            return None;
        }
        Some(SessionError::UnexpectedOrigin {
            expected: expected.to_string(),
            actual: host,
        })
    }
}

enum ActionError {
    Step(StepError),
    Lost(String),
}
