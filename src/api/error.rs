use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::errors::MeterError;

/// Core errors on their way out of an HTTP handler.
#[derive(Debug)]
pub struct ApiError(pub MeterError);

impl From<MeterError> for ApiError {
    fn from(err: MeterError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            MeterError::NoActiveSession
            | MeterError::AlreadyActive { .. }
            | MeterError::SamplerRunning => StatusCode::CONFLICT,
            MeterError::SessionNotFound { .. } | MeterError::NoSessionsRecorded => {
                StatusCode::NOT_FOUND
            }
            MeterError::Transport { .. } => StatusCode::BAD_GATEWAY,
            MeterError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(json!({
                "error": self.0.kind(),
                "message": self.0.to_string(),
            })),
        )
            .into_response()
    }
}
