use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sweep_bridge::BridgeError;
use sweep_core::{ApplyBestError, OptimizeError};

/// Unified error type for hub API responses.
#[derive(Debug)]
pub enum HubError {
    NotFound(String),
    BadRequest(String),
    /// Another sweep or replay owns the page.
    Busy,
    /// The in-page agent could not be reached or answered with an error.
    Page(String),
    /// Replaying best inputs stopped at `parameter`.
    ApplyFailed {
        parameter: Option<String>,
        message: String,
    },
}

impl std::fmt::Display for HubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "not_found: {msg}"),
            Self::BadRequest(msg) => write!(f, "bad_request: {msg}"),
            Self::Busy => write!(f, "run_in_progress"),
            Self::Page(msg) => write!(f, "page_error: {msg}"),
            Self::ApplyFailed { message, .. } => write!(f, "apply_failed: {message}"),
        }
    }
}

impl std::error::Error for HubError {}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            Self::Busy => (
                StatusCode::CONFLICT,
                json!({ "error": "another run is already driving the page" }),
            ),
            Self::Page(msg) => (
                StatusCode::BAD_GATEWAY,
                json!({ "error": format!("page_error:{msg}") }),
            ),
            Self::ApplyFailed { parameter, message } => (
                StatusCode::BAD_GATEWAY,
                json!({ "error": message, "parameter": parameter }),
            ),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<OptimizeError> for HubError {
    fn from(e: OptimizeError) -> Self {
        match e {
            OptimizeError::InvalidConfiguration(cfg) => Self::BadRequest(cfg.to_string()),
            OptimizeError::RunInProgress => Self::Busy,
        }
    }
}

impl From<ApplyBestError> for HubError {
    fn from(e: ApplyBestError) -> Self {
        match e {
            ApplyBestError::RunInProgress => Self::Busy,
            ApplyBestError::InvalidValue { .. } => Self::BadRequest(e.to_string()),
            ApplyBestError::Step { .. } => Self::ApplyFailed {
                parameter: e.parameter().map(str::to_string),
                message: e.to_string(),
            },
        }
    }
}

impl From<BridgeError> for HubError {
    fn from(e: BridgeError) -> Self {
        Self::Page(e.to_string())
    }
}
