use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::api::state::{ActiveReplay, AppState};
use crate::browser::{BrowserManager, BrowserOptions, PageDriver};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::extensions::{
    CaptchaExtension, ExtensionPipeline, HumanPacingExtension, LoggingExtension, PopupDismissExtension,
    ScreenshotExtension, SignalResolver,
};
use crate::models::{
    normalize_origin, ExtensionsRequest, GenericResponse, MappingSet, ReplayRequest, ReplayState,
    ReplayStatusResponse, StartReplayResponse,
};
use crate::recording::normalize;
use crate::replay::{ReplayEngine, ReplayHandle, ReplayPlan};

fn build_extensions(config: &Config, request: &ExtensionsRequest, captcha: SignalResolver) -> ExtensionPipeline {
    let mut pipeline = ExtensionPipeline::new().with(LoggingExtension::new(request.verbose));

    if request.dismiss_popups {
        pipeline.register(PopupDismissExtension::default());
    }
    if request.captcha {
        pipeline.register(CaptchaExtension::new().with_resolver(Arc::new(captcha)));
    }
    if request.human_pacing {
        pipeline.register(HumanPacingExtension::default());
    }
    if request.screenshots || config.screenshot_dir.is_some() {
        let dir = config
            .screenshot_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("formfill-screenshots"));
        pipeline.register(ScreenshotExtension::new(dir).on_success(request.screenshot_successes));
    }

    pipeline
}

/// Fill a form from stored or inline mappings
pub async fn start_replay(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReplayRequest>,
) -> Result<Response> {
    let set: MappingSet = match (request.mappings, request.origin.as_deref()) {
        (Some(mut set), _) => {
            // Inline sets come from outside the store and are keyed the same way
            set.origin = normalize_origin(&set.origin).ok_or_else(|| {
                AppError::ValidationError(format!("Invalid origin in mappings: {:?}", set.origin))
            })?;
            set
        }
        (None, Some(origin)) => state
            .store
            .get(origin)
            .ok_or_else(|| AppError::MappingNotFound(origin.to_string()))?
            .as_ref()
            .clone(),
        (None, None) => {
            return Err(AppError::ValidationError(
                "Either origin or mappings is required".to_string(),
            ))
        }
    };

    let plan = match &request.recording {
        Some(raw) => ReplayPlan::from_recording(&normalize(raw)?, &set),
        None => ReplayPlan::from_mappings(&set),
    };
    if plan.is_empty() {
        return Err(AppError::ValidationError("Nothing to replay".to_string()));
    }

    let options = request.options.apply(state.config.replay_options());
    let captcha = SignalResolver::new();
    let extensions = build_extensions(&state.config, &request.extensions, captcha.clone());
    let driver: Arc<dyn PageDriver> = Arc::new(BrowserManager::new(BrowserOptions {
        headless: request.headless.unwrap_or(state.config.headless),
        ..Default::default()
    }));

    let handle = ReplayHandle::with_events(state.events.clone());
    let session_id = handle.session_id().to_string();
    state.replays.insert(
        session_id.clone(),
        ActiveReplay {
            handle: handle.clone(),
            captcha,
            started_at: Utc::now(),
        },
    );

    tracing::info!(
        "Starting replay {} on {} ({} steps, {} mapped fields)",
        session_id,
        plan.origin,
        plan.len(),
        plan.mapped_fields()
    );

    // The replay runs on its own task so a dropped request cannot strand the browser
    let engine = ReplayEngine::new(driver, options);
    let profile = Arc::new(request.profile);
    let task_state = Arc::clone(&state);
    let task = tokio::spawn(async move {
        let report = engine.run(plan, profile, extensions, &handle).await;
        task_state.finish_replay(report.clone());
        report
    });

    if !request.wait {
        let body = StartReplayResponse {
            session_id,
            status: "started".to_string(),
        };
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let report = task
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Replay task failed: {}", e)))?;
    Ok(Json(report).into_response())
}

pub async fn get_replay_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<ReplayStatusResponse>> {
    if state.replays.contains_key(&session_id) {
        return Ok(Json(ReplayStatusResponse {
            session_id,
            state: ReplayState::Running,
            report: None,
        }));
    }

    let report = state
        .finished
        .get(&session_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::SessionNotFound(session_id.clone()))?;

    Ok(Json(ReplayStatusResponse {
        session_id,
        state: report.state,
        report: Some(report),
    }))
}

/// Stop a replay before its next step
pub async fn cancel_replay(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<GenericResponse>> {
    let active = state
        .replays
        .get(&session_id)
        .ok_or_else(|| AppError::SessionNotFound(session_id.clone()))?;
    active.handle.cancel();

    tracing::info!("Cancellation requested for replay {}", session_id);
    Ok(Json(GenericResponse {
        status: "cancelling".to_string(),
    }))
}

/// Tell a replay waiting on a CAPTCHA that it has been solved
pub async fn resolve_captcha(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<GenericResponse>> {
    let active = state
        .replays
        .get(&session_id)
        .ok_or_else(|| AppError::SessionNotFound(session_id.clone()))?;
    active.captcha.signal();

    Ok(Json(GenericResponse {
        status: "resolved".to_string(),
    }))
}
