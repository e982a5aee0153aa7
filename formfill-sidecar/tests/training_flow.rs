//! Recording -> stored mappings -> live analysis -> replay.

mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use common::{signup_recording, FakeDriver};
use formfill_sidecar::analyzer::LiveFieldAnalyzer;
use formfill_sidecar::config::ReplayOptions;
use formfill_sidecar::error::TrainingError;
use formfill_sidecar::extensions::ExtensionPipeline;
use formfill_sidecar::models::{FillStrategy, MappingSource, Profile, ReplayState};
use formfill_sidecar::recording::Trainer;
use formfill_sidecar::replay::{ReplayEngine, ReplayHandle, ReplayPlan};
use formfill_sidecar::store::MappingStore;

const ORIGIN: &str = "www.shop.example.com";

// ============================================================================
// Training and persistence
// ============================================================================

#[tokio::test]
async fn test_trained_mappings_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("mappings.db");

    {
        let trainer = Trainer::new(MappingStore::open(&db).unwrap());
        let report = trainer.train(&signup_recording(), None).await.unwrap();
        assert_eq!(report.origin, ORIGIN);
        assert_eq!(report.fields_learned, 4);
        assert_eq!(report.mapped, 3);
        assert_eq!(report.unmapped, 1);
    }

    let store = MappingStore::open(&db).unwrap();
    let set = store.get("https://www.shop.example.com/account").unwrap();
    assert_eq!(set.source_url, "https://www.shop.example.com/register");

    let email = set.get("#email").unwrap();
    assert_eq!(email.profile_field.as_deref(), Some("email"));
    assert_eq!(email.source, MappingSource::AriaLabel);
    assert_eq!(email.alternative_selectors, vec!["aria/Email address"]);

    let first_name = set.get("#first-name").unwrap();
    assert_eq!(first_name.profile_field.as_deref(), Some("firstName"));
    assert_eq!(first_name.alternative_selectors, vec!["xpath///*[@id=\"first-name\"]"]);

    assert_eq!(set.get("#postcode").unwrap().profile_field.as_deref(), Some("zip"));
    assert!(set.get("#favourite-colour").unwrap().profile_field.is_none());
}

#[tokio::test]
async fn test_retraining_replaces_whole_set() {
    let store = MappingStore::in_memory();
    let trainer = Trainer::new(store.clone());
    trainer.train(&signup_recording(), None).await.unwrap();

    let shorter = json!({
        "steps": [
            { "type": "navigate", "url": "https://www.shop.example.com/register" },
            { "type": "change", "value": "jane@example.com", "selectors": [["#email"]] }
        ]
    });
    let report = trainer.train(&shorter, None).await.unwrap();
    assert_eq!(report.fields_learned, 1);

    let set = store.get(ORIGIN).unwrap();
    assert_eq!(set.mappings.len(), 1);
    assert!(set.get("#postcode").is_none());
}

#[test]
fn test_training_uses_url_hint_without_navigation() {
    let store = MappingStore::in_memory();
    let trainer = Trainer::new(store.clone());
    let raw = json!({
        "steps": [ { "type": "change", "value": "0412 345 678", "selectors": [["#mobile"]] } ]
    });

    let missing = tokio_test::block_on(trainer.train(&raw, None));
    assert!(matches!(missing, Err(TrainingError::NoOrigin)));

    let report = tokio_test::block_on(trainer.train(&raw, Some("https://Accounts.Example.org/join"))).unwrap();
    assert_eq!(report.origin, "accounts.example.org");
    assert_eq!(store.get("accounts.example.org").unwrap().mappings[0].profile_field.as_deref(), Some("phone"));
}

#[test]
fn test_recording_without_fields_is_rejected() {
    let trainer = Trainer::new(MappingStore::in_memory());
    let raw = json!({
        "steps": [
            { "type": "navigate", "url": "https://example.com" },
            { "type": "click", "selectors": [["#start"]] }
        ]
    });
    let result = tokio_test::block_on(trainer.train(&raw, None));
    assert!(matches!(result, Err(TrainingError::NoFormFields)));
}

// ============================================================================
// Live analysis
// ============================================================================

#[tokio::test]
async fn test_live_analysis_refines_strategies() {
    let trainer = Trainer::new(MappingStore::in_memory());
    let (_, set) = trainer.learn(&signup_recording(), None).unwrap();

    let driver = FakeDriver::default();
    driver.set_probe("#email", json!({ "tagName": "input", "inputType": "email" }));
    driver.set_probe("#first-name", json!({ "tagName": "input", "inputType": "text" }));
    driver.set_probe(
        "#postcode",
        json!({ "tagName": "input", "inputType": "text", "inputMode": "numeric", "pattern": "\\d{4}" }),
    );

    let analyzer = LiveFieldAnalyzer::new().with_timeout(Duration::from_millis(20));
    let analyzed = analyzer.analyze(&driver, &set, None).await.unwrap();

    assert_eq!(driver.calls()[0], "navigate https://www.shop.example.com/register");
    assert_eq!(analyzed.trained_at, set.trained_at);

    let email = analyzed.get("#email").unwrap();
    assert_eq!(email.fill_strategy, FillStrategy::DirectType);
    assert_eq!(email.source, MappingSource::LiveAnalysis);
    assert!(!email.stale);

    assert_eq!(analyzed.get("#postcode").unwrap().fill_strategy, FillStrategy::CharByChar);

    // Not on the page any more: kept as trained, flagged
    let favourite = analyzed.get("#favourite-colour").unwrap();
    assert!(favourite.stale);
    assert_eq!(favourite.source, MappingSource::SelectorPattern);
    assert_eq!(favourite.fill_strategy, FillStrategy::DirectType);

    // Saving the enriched set replaces the trained one
    let report = trainer.save(analyzed).await.unwrap();
    assert_eq!(report.fields_learned, 4);
}

#[tokio::test]
async fn test_analysis_saved_to_store() {
    let store = MappingStore::in_memory();
    let trainer = Trainer::new(store.clone());
    trainer.train(&signup_recording(), None).await.unwrap();
    let trained = store.get(ORIGIN).unwrap();

    let driver = FakeDriver::default();
    driver.set_probe("#postcode", json!({ "tagName": "input", "inputType": "tel" }));

    let analyzer = LiveFieldAnalyzer::new().with_timeout(Duration::ZERO);
    let analyzed = analyzer.analyze(&driver, &trained, None).await.unwrap();
    trainer.save(analyzed).await.unwrap();

    let stored = store.get(ORIGIN).unwrap();
    assert_eq!(stored.get("#postcode").unwrap().fill_strategy, FillStrategy::CharByChar);
    assert_eq!(store.stats().stale, 3);
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn test_trained_recording_replays_with_profile() {
    let store = MappingStore::in_memory();
    let trainer = Trainer::new(store.clone());
    let (recording, _) = trainer.learn(&signup_recording(), None).unwrap();
    trainer.train(&signup_recording(), None).await.unwrap();
    let set = store.get(ORIGIN).unwrap();

    let driver = Arc::new(FakeDriver::with_fields(&[
        "#email",
        "#first-name",
        "#postcode",
        "#favourite-colour",
        "#help",
        "#submit",
    ]));
    let profile: Profile = [
        ("E-mail", "jane@example.com"),
        ("Given Name", "Jane"),
        ("Postal Code", "2000"),
    ]
    .into_iter()
    .collect();

    let plan = ReplayPlan::from_recording(&recording, &set);
    let report = ReplayEngine::new(driver.clone(), ReplayOptions::immediate())
        .run(plan, Arc::new(profile), ExtensionPipeline::new(), &ReplayHandle::new())
        .await;

    assert_eq!(report.state, ReplayState::Completed);
    assert_eq!(report.origin, ORIGIN);
    assert_eq!(report.summary.fields_total, 4);
    assert_eq!(report.summary.fields_filled, 3);
    assert_eq!(driver.typed("#email").as_deref(), Some("jane@example.com"));
    assert_eq!(driver.typed("#first-name").as_deref(), Some("Jane"));
    assert_eq!(driver.typed("#postcode").as_deref(), Some("2000"));
    assert!(driver.typed("#favourite-colour").is_none());
    assert_eq!(driver.calls().last().map(String::as_str), Some("click #submit"));
}
