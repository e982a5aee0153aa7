use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::sync::Arc;

use crate::analyzer::LiveFieldAnalyzer;
use crate::api::state::AppState;
use crate::browser::{BrowserManager, BrowserOptions, PageDriver};
use crate::error::{AppError, Result, SessionError};
use crate::models::{
    AnalyzeRequest, GenericResponse, ImportResponse, MappingSet, MappingSummary, SearchQuery,
};
use crate::store::{FieldMatch, StoreStats};

/// Open a throwaway browser, probe `set` on the live page, then close it
pub(crate) async fn analyze_live(
    state: &AppState,
    set: &MappingSet,
    url: Option<&str>,
    headless: bool,
) -> std::result::Result<MappingSet, SessionError> {
    let browser = BrowserManager::new(BrowserOptions {
        headless,
        ..Default::default()
    });
    browser
        .open()
        .await
        .map_err(|e| SessionError::BrowserLaunch(e.to_string()))?;

    let analyzer = LiveFieldAnalyzer::new().with_timeout(state.config.element_timeout);
    let result = analyzer.analyze(&browser, set, url).await;

    if let Err(e) = browser.close().await {
        tracing::warn!("Failed to close analysis browser: {}", e);
    }
    result
}

pub async fn list_mappings(State(state): State<Arc<AppState>>) -> Json<Vec<MappingSummary>> {
    let summaries = state
        .store
        .all_origins()
        .iter()
        .filter_map(|origin| state.store.get(origin))
        .map(|set| MappingSummary::from(set.as_ref()))
        .collect();
    Json(summaries)
}

pub async fn get_mappings(
    State(state): State<Arc<AppState>>,
    Path(origin): Path<String>,
) -> Result<Json<MappingSet>> {
    let set = state
        .store
        .get(&origin)
        .ok_or(AppError::MappingNotFound(origin))?;
    Ok(Json(set.as_ref().clone()))
}

pub async fn delete_mappings(
    State(state): State<Arc<AppState>>,
    Path(origin): Path<String>,
) -> Result<Json<GenericResponse>> {
    if !state.store.delete(&origin).await? {
        return Err(AppError::MappingNotFound(origin));
    }
    tracing::info!("Deleted mappings for {}", origin);
    Ok(Json(GenericResponse {
        status: "deleted".to_string(),
    }))
}

/// Re-probe a stored set on its live page and store the refined strategies
pub async fn analyze_mappings(
    State(state): State<Arc<AppState>>,
    Path(origin): Path<String>,
    request: Option<Json<AnalyzeRequest>>,
) -> Result<Json<MappingSet>> {
    let Json(request) = request.unwrap_or_default();
    let set = state
        .store
        .get(&origin)
        .ok_or_else(|| AppError::MappingNotFound(origin.clone()))?;

    let headless = request.headless.unwrap_or(state.config.headless);
    let analyzed = analyze_live(&state, &set, request.url.as_deref(), headless).await?;

    state.trainer.save(analyzed.clone()).await?;
    Ok(Json(analyzed))
}

pub async fn search_mappings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<FieldMatch>> {
    Json(state.store.search_by_field(&query.field))
}

pub async fn mapping_stats(State(state): State<Arc<AppState>>) -> Json<StoreStats> {
    Json(state.store.stats())
}

pub async fn export_mappings(
    State(state): State<Arc<AppState>>,
    Path(origin): Path<String>,
) -> Result<impl IntoResponse> {
    let json = state
        .store
        .export_json(&origin)?
        .ok_or(AppError::MappingNotFound(origin))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], json))
}

pub async fn import_mappings(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Json<ImportResponse>> {
    let origin = state.store.import_json(&payload.to_string()).await?;
    tracing::info!("Imported mappings for {}", origin);
    Ok(Json(ImportResponse { origin }))
}
