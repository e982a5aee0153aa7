use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Fatal errors raised while turning a recording into a mapping set.
#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Malformed recording at step {index}: {detail}")]
    MalformedRecording { index: usize, detail: String },

    #[error("Malformed recording export: {0}")]
    InvalidExport(String),

    #[error("Could not determine origin from recording")]
    NoOrigin,

    #[error("Recording contains no form field changes")]
    NoFormFields,

    #[error("Failed to persist mappings: {0}")]
    Persistence(String),

    #[error("A newer mapping set for {origin} is already stored")]
    Superseded { origin: String },
}

/// Per-step failures. These never escape the replay loop; they are folded
/// into the step's outcome and the loop moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("selector-not-found")]
    SelectorNotFound,

    #[error("no-profile-value")]
    NoProfileValue,

    #[error("{0}")]
    Automation(String),

    #[error("timeout")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("aborted")]
    Aborted,

    #[error("unsupported-step")]
    Unsupported,
}

/// Session-level failures that abort a whole replay.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Failed to open browser session: {0}")]
    BrowserLaunch(String),

    #[error("Browser session lost: {0}")]
    BrowserLost(String),

    #[error("Navigation to unexpected origin: expected {expected}, got {actual}")]
    UnexpectedOrigin { expected: String, actual: String },
}

/// Errors reported by a page driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Browser session lost: {0}")]
    SessionLost(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("{0}")]
    Automation(String),
}

impl From<DriverError> for StepError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::ElementNotFound(_) => StepError::SelectorNotFound,
            other => StepError::Automation(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No mappings for origin: {0}")]
    MappingNotFound(String),

    #[error("Replay session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid request: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Training(#[from] TrainingError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::MappingNotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            AppError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            AppError::Training(TrainingError::Persistence(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Training Error")
            }
            AppError::Training(TrainingError::Superseded { .. }) => (StatusCode::CONFLICT, "Conflict"),
            AppError::Training(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Training Error"),
            AppError::Session(_) => (StatusCode::BAD_GATEWAY, "Browser Error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error"),
        };

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            detail: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
