//! Error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use parley_core::{ChatError, ErrorBody, Surface};

/// A [`ChatError`] rendered as `{code, message, cause?}` with its status.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl ApiError {
    pub fn missing_parameter(name: &str) -> Self {
        ApiError(ChatError::bad_request(
            Surface::Api,
            format!("Parameter {} is missing", name),
        ))
    }

    pub fn invalid_parameter(name: &str, detail: impl std::fmt::Display) -> Self {
        ApiError(ChatError::bad_request(
            Surface::Api,
            format!("Parameter {} is invalid: {}", name, detail),
        ))
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.kind.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(code = %self.0.code(), cause = ?self.0.cause, "Request failed");
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}
