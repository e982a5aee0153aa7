//! Extension hooks as seen from a running replay.

mod common;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::FakeDriver;
use formfill_sidecar::config::ReplayOptions;
use formfill_sidecar::extensions::{
    CaptchaExtension, ExtensionPipeline, HumanPacingExtension, PopupDismissExtension, ReplayContext,
    ReplayExtension, ScreenshotExtension, SignalResolver,
};
use formfill_sidecar::models::{
    FieldMapping, MappingSet, MappingSource, PlannedStep, Profile, ReplayReport, ReplayState, Step, StepKind,
    StepOutcome,
};
use formfill_sidecar::replay::{ReplayEngine, ReplayHandle, ReplayPlan};

fn email_plan() -> ReplayPlan {
    ReplayPlan::from_mappings(&MappingSet::new(
        "example.com",
        "https://example.com/join",
        vec![FieldMapping::new("#email", Some("email".to_string()), MappingSource::AriaLabel)],
    ))
}

/// Navigate, then click a submit button
fn submit_plan() -> ReplayPlan {
    let mut click = Step::new(StepKind::Click);
    click.selectors = vec![vec!["#submit".to_string()]];
    ReplayPlan {
        origin: "example.com".to_string(),
        source_url: "https://example.com/join".to_string(),
        steps: vec![
            PlannedStep {
                index: 0,
                step: Step::navigate("https://example.com/join"),
                mapping: None,
            },
            PlannedStep {
                index: 1,
                step: click,
                mapping: None,
            },
        ],
    }
}

async fn run(driver: &Arc<FakeDriver>, plan: ReplayPlan, extensions: ExtensionPipeline) -> ReplayReport {
    let profile: Profile = [("email", "jane@example.com")].into_iter().collect();
    ReplayEngine::new(driver.clone(), ReplayOptions::immediate())
        .run(plan, Arc::new(profile), extensions, &ReplayHandle::new())
        .await
}

/// Logs every call point it sees into a shared list
struct Tracer {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Tracer {
    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(format!("{}:{}", self.name, entry));
    }
}

#[async_trait]
impl ReplayExtension for Tracer {
    fn name(&self) -> &str {
        self.name
    }

    async fn before_all_steps(&mut self, _ctx: &mut ReplayContext) -> anyhow::Result<()> {
        self.push("before_all".to_string());
        Ok(())
    }

    async fn before_each_step(&mut self, step: &PlannedStep, _ctx: &mut ReplayContext) -> anyhow::Result<()> {
        self.push(format!("before_each:{}", step.index));
        Ok(())
    }

    async fn after_each_step(
        &mut self,
        step: &PlannedStep,
        _outcome: &StepOutcome,
        _ctx: &mut ReplayContext,
    ) -> anyhow::Result<()> {
        self.push(format!("after_each:{}", step.index));
        Ok(())
    }

    async fn after_all_steps(&mut self, results: &[StepOutcome], _ctx: &mut ReplayContext) -> anyhow::Result<()> {
        self.push(format!("after_all:{}", results.len()));
        Ok(())
    }
}

/// Records the lifecycle state each call point observes
#[derive(Default)]
struct StateWatcher {
    seen: Arc<Mutex<Vec<(&'static str, ReplayState)>>>,
}

#[async_trait]
impl ReplayExtension for StateWatcher {
    fn name(&self) -> &str {
        "state_watcher"
    }

    async fn before_all_steps(&mut self, ctx: &mut ReplayContext) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(("before_all", ctx.state));
        Ok(())
    }

    async fn before_each_step(&mut self, _step: &PlannedStep, ctx: &mut ReplayContext) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(("before_each", ctx.state));
        Ok(())
    }
}

/// Fails one hook and panics in another
struct Faulty;

#[async_trait]
impl ReplayExtension for Faulty {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn before_all_steps(&mut self, _ctx: &mut ReplayContext) -> anyhow::Result<()> {
        anyhow::bail!("cannot reach dashboard")
    }

    async fn before_each_step(&mut self, _step: &PlannedStep, _ctx: &mut ReplayContext) -> anyhow::Result<()> {
        panic!("extension bug");
    }
}

// ============================================================================
// Pipeline ordering and isolation
// ============================================================================

#[tokio::test]
async fn test_hooks_run_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let extensions = ExtensionPipeline::new()
        .with(Tracer { name: "a", log: log.clone() })
        .with(Tracer { name: "b", log: log.clone() });

    let driver = Arc::new(FakeDriver::with_fields(&["#email"]));
    let report = run(&driver, email_plan(), extensions).await;
    assert_eq!(report.state, ReplayState::Completed);

    let expected = vec![
        "a:before_all",
        "b:before_all",
        "a:before_each:0",
        "b:before_each:0",
        "a:after_each:0",
        "b:after_each:0",
        "a:before_each:1",
        "b:before_each:1",
        "a:after_each:1",
        "b:after_each:1",
        "a:after_all:2",
        "b:after_all:2",
    ];
    assert_eq!(*log.lock().unwrap(), expected);
}

#[tokio::test]
async fn test_failing_hooks_are_isolated() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let extensions = ExtensionPipeline::new()
        .with(Faulty)
        .with(Tracer { name: "after", log: log.clone() });

    let driver = Arc::new(FakeDriver::with_fields(&["#email"]));
    let report = run(&driver, email_plan(), extensions).await;

    assert_eq!(report.state, ReplayState::Completed);
    assert_eq!(report.summary.fields_filled, 1);
    assert_eq!(driver.typed("#email").as_deref(), Some("jane@example.com"));

    let log = log.lock().unwrap();
    assert_eq!(log.first().map(String::as_str), Some("after:before_all"));
    assert_eq!(log.iter().filter(|e| e.contains("before_each")).count(), 2);
    assert_eq!(log.last().map(String::as_str), Some("after:after_all:2"));
}

#[tokio::test]
async fn test_setup_hooks_run_before_steps_start() {
    let watcher = StateWatcher::default();
    let seen = watcher.seen.clone();

    let driver = Arc::new(FakeDriver::with_fields(&["#email"]));
    let report = run(&driver, email_plan(), ExtensionPipeline::new().with(watcher)).await;
    assert_eq!(report.state, ReplayState::Completed);

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], ("before_all", ReplayState::Initializing));
    assert!(seen[1..].iter().all(|s| *s == ("before_each", ReplayState::Running)));
    assert_eq!(seen.len(), 3);
}

#[test]
fn test_pipeline_stats_by_name() {
    let pipeline = ExtensionPipeline::new()
        .with(PopupDismissExtension::default())
        .with(HumanPacingExtension::default());
    let stats = pipeline.stats();
    assert_eq!(stats["popup_dismiss"]["dismissed"], 0);
    assert_eq!(stats["human_pacing"]["total_waited_ms"], 0);
    assert_eq!(pipeline.names(), vec!["popup_dismiss", "human_pacing"]);
}

// ============================================================================
// Built-in extensions
// ============================================================================

#[tokio::test]
async fn test_screenshot_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(FakeDriver::with_fields(&["#email"]));
    driver.failing.lock().unwrap().insert("#email".to_string());

    let extensions = ExtensionPipeline::new().with(ScreenshotExtension::new(dir.path().join("shots")));
    let report = run(&driver, email_plan(), extensions).await;

    let files: Vec<_> = std::fs::read_dir(dir.path().join("shots"))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].contains("_001_email_error_"));
    assert!(files[0].ends_with(".png"));
    assert_eq!(report.extension_stats["screenshot"]["saved"], 1);
}

#[tokio::test]
async fn test_popup_dismissed_before_filling() {
    let driver = Arc::new(FakeDriver::with_fields(&["#email", "#onetrust-accept-btn-handler"]));
    driver.click_removes.lock().unwrap().insert(
        "#onetrust-accept-btn-handler".to_string(),
        vec!["#onetrust-accept-btn-handler".to_string()],
    );

    let extensions =
        ExtensionPipeline::new().with(PopupDismissExtension::default().with_settle(Duration::ZERO));
    let report = run(&driver, email_plan(), extensions).await;

    let calls = driver.calls();
    let dismissed = calls
        .iter()
        .position(|c| c == "click #onetrust-accept-btn-handler")
        .unwrap();
    let typed = calls.iter().position(|c| c.starts_with("type #email")).unwrap();
    assert!(dismissed < typed);
    assert_eq!(report.extension_stats["popup_dismiss"]["dismissed"], 1);
}

#[tokio::test]
async fn test_captcha_waits_for_resolver() {
    let driver = Arc::new(FakeDriver::with_fields(&["#submit", "#recaptcha"]));
    driver
        .click_removes
        .lock()
        .unwrap()
        .insert("#submit".to_string(), vec!["#recaptcha".to_string()]);

    let resolver = SignalResolver::new();
    // The permit is kept until the extension starts waiting
    resolver.signal();

    let captcha = CaptchaExtension::new()
        .with_resolver(Arc::new(resolver.clone()))
        .with_max_wait(Duration::from_secs(2));
    let report = run(&driver, submit_plan(), ExtensionPipeline::new().with(captcha)).await;

    assert_eq!(report.state, ReplayState::Completed);
    let stats = &report.extension_stats["captcha"];
    assert_eq!(stats["detected"], 1);
    assert_eq!(stats["solved"], 1);
    assert_eq!(stats["kinds"][0], "recaptcha");
}

#[tokio::test]
async fn test_captcha_manual_polling() {
    let driver = Arc::new(FakeDriver::with_fields(&["#submit", "#recaptcha"]));

    let solver = driver.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        solver.remove("#recaptcha");
    });

    let captcha = CaptchaExtension::new()
        .with_max_wait(Duration::from_secs(2))
        .with_poll_interval(Duration::from_millis(10));
    let report = run(&driver, submit_plan(), ExtensionPipeline::new().with(captcha)).await;

    let stats = &report.extension_stats["captcha"];
    assert_eq!(stats["manual_interventions"], 1);
    assert_eq!(stats["solved"], 1);
    assert_eq!(stats["failed"], 0);
    assert!(driver.calls().contains(&"click #submit".to_string()));
}

#[tokio::test]
async fn test_captcha_gives_up_after_max_wait() {
    let driver = Arc::new(FakeDriver::with_fields(&["#submit", "iframe[src*='hcaptcha']"]));

    let captcha = CaptchaExtension::new()
        .with_max_wait(Duration::from_millis(50))
        .with_poll_interval(Duration::from_millis(10));
    let report = run(&driver, submit_plan(), ExtensionPipeline::new().with(captcha)).await;

    // Unsolved challenges are reported, the replay itself carries on
    assert_eq!(report.state, ReplayState::Completed);
    let stats = &report.extension_stats["captcha"];
    assert_eq!(stats["detected"], 2);
    assert_eq!(stats["failed"], 2);
    assert_eq!(stats["kinds"][0], "hcaptcha");
}

#[tokio::test]
async fn test_human_pacing_waits() {
    let driver = Arc::new(FakeDriver::with_fields(&["#email"]));
    let pacing = HumanPacingExtension::new(Duration::from_millis(5), Duration::from_millis(10));

    let report = run(&driver, email_plan(), ExtensionPipeline::new().with(pacing)).await;

    // Only the Change step is paced, not the navigation
    let waited = report.extension_stats["human_pacing"]["total_waited_ms"].as_u64().unwrap();
    assert!((5..=10).contains(&waited));
}
