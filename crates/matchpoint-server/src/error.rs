use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Error kinds surfaced by the coordinator core. All are returned to the
/// caller synchronously; a rejected operation never mutates state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    NotFound(String),
    Unauthorized(String),
    InvalidState(String),
    InvalidMove(String),
    InvalidArgument(String),
    Internal(String),
}

impl std::fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(m)
            | Self::Unauthorized(m)
            | Self::InvalidState(m)
            | Self::InvalidMove(m)
            | Self::InvalidArgument(m)
            | Self::Internal(m) => write!(f, "{m}"),
        }
    }
}

impl std::error::Error for CoordinatorError {}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            Self::Unauthorized(m) => (StatusCode::FORBIDDEN, m.clone()),
            Self::InvalidState(m) => (StatusCode::CONFLICT, m.clone()),
            Self::InvalidMove(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
            Self::InvalidArgument(m) => (StatusCode::BAD_REQUEST, m.clone()),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
