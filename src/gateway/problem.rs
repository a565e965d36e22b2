//! Error responses: `{ "kind": ..., "detail": ... }` with a status per kind.

use crate::error::ApiError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemBody {
    pub kind: String,
    pub detail: String,
}

pub fn status_for(err: &ApiError) -> StatusCode {
    match err {
        ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        ApiError::UnknownIdentity(_) => StatusCode::NOT_FOUND,
        ApiError::MalformedDescriptor(_) | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ApiError::SchemaViolation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ApiError::DuplicateNameConflict { .. }
        | ApiError::InvalidTransition { .. }
        | ApiError::AlreadyRunning(_) => StatusCode::CONFLICT,
        ApiError::RecipientUnavailable { .. } => StatusCode::GONE,
        ApiError::DeliveryExhausted { .. } => StatusCode::GATEWAY_TIMEOUT,
        ApiError::SpawnFailed { .. } | ApiError::StorageError(_) | ApiError::ConfigError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() && !matches!(self, ApiError::DeliveryExhausted { .. }) {
            error!(kind = self.kind(), error = %self, "Request failed");
        }
        let body = ProblemBody {
            kind: self.kind().to_string(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
