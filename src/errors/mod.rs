/// Unified error handling module
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Unified error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("External API error: {0}")]
    ExternalApi(#[from] reqwest::Error),
    #[error("Upstream returned status {0}")]
    UpstreamStatus(u16),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid orbital elements: {0}")]
    InvalidElements(String),
    #[error("No ISS record found in orbital elements")]
    NoIssRecord,
    #[error("Could not build orbital model: {0}")]
    ModelBuild(String),
    #[error("All orbital element sources failed, last error: {0}")]
    ElementsUnavailable(String),
    #[error("Geolocation unavailable: {0}")]
    Geolocation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::ExternalApi(e) => match e.status().map(|s| s.as_u16()) {
                Some(status) => upstream_code(status),
                None => "UPSTREAM_ERROR",
            },
            ApiError::UpstreamStatus(status) => upstream_code(*status),
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::InvalidElements(_) => "INVALID_ELEMENTS",
            ApiError::NoIssRecord => "NO_ISS_RECORD",
            ApiError::ModelBuild(_) => "MODEL_BUILD_FAILED",
            ApiError::ElementsUnavailable(_) => "ELEMENTS_UNAVAILABLE",
            ApiError::Geolocation(_) => "GEOLOCATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

fn upstream_code(status: u16) -> &'static str {
    match status {
        403 => "UPSTREAM_403",
        404 => "UPSTREAM_404",
        429 => "UPSTREAM_429",
        500..=599 => "UPSTREAM_5XX",
        _ => "UPSTREAM_ERROR",
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidPayload(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_response = ErrorResponse {
            ok: false,
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
            },
        };

        // Always HTTP 200 with ok=false; the HUD renders the message as a banner
        (StatusCode::OK, Json(error_response)).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

/// Which kind of operation an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Telemetry,
    Elements,
    Model,
    Geolocation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfacedError {
    pub category: ErrorCategory,
    pub code: &'static str,
    pub message: String,
    pub at_ms: i64,
}

/// Single error banner: the most recent error wins, and a success only clears
/// an error of its own category.
#[derive(Debug, Default, Clone)]
pub struct ErrorSurface {
    current: Option<SurfacedError>,
}

impl ErrorSurface {
    pub fn report(&mut self, category: ErrorCategory, error: &ApiError, at_ms: i64) {
        self.current = Some(SurfacedError {
            category,
            code: error.code(),
            message: error.to_string(),
            at_ms,
        });
    }

    pub fn clear(&mut self, category: ErrorCategory) {
        if self.current.as_ref().map(|e| e.category) == Some(category) {
            self.current = None;
        }
    }

    pub fn current(&self) -> Option<&SurfacedError> {
        self.current.as_ref()
    }
}
