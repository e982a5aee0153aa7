use axum::{extract::State, Json};
use std::sync::Arc;

use super::mappings::analyze_live;
use crate::api::state::AppState;
use crate::error::Result;
use crate::models::TrainRequest;
use crate::recording::TrainingReport;

/// Learn field mappings from a recorder export and store them for the origin
pub async fn train_recording(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrainRequest>,
) -> Result<Json<TrainingReport>> {
    if !request.analyze {
        let report = state.trainer.train(&request.recording, request.url.as_deref()).await?;
        return Ok(Json(report));
    }

    let (_, learned) = state.trainer.learn(&request.recording, request.url.as_deref())?;
    let headless = request.headless.unwrap_or(state.config.headless);
    let analyzed = analyze_live(&state, &learned, None, headless).await?;

    let report = state.trainer.save(analyzed).await?;
    tracing::info!(
        "Trained and analyzed {}: {} fields ({} mapped)",
        report.origin,
        report.fields_learned,
        report.mapped
    );
    Ok(Json(report))
}
