//! HTTP error mapping

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use openapi_server::models::ErrorResponse;
use serde_json::json;

use crate::errors::ControllerError;

impl ControllerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ControllerError::InvalidState(_) | ControllerError::ValidationError(_) => {
                StatusCode::BAD_REQUEST
            }
            ControllerError::ContainerNotFound(_) => StatusCode::NOT_FOUND,
            ControllerError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ControllerError::VerificationFailed(_) | ControllerError::BackendOperationFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON error body
    pub fn error_response(&self) -> ErrorResponse {
        let category = if self.is_client_error() {
            "client"
        } else {
            "server"
        };
        let details = match self {
            ControllerError::Persistence { updated, .. } => Some(json!({ "updated": updated })),
            _ => None,
        };

        ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
            category: category.to_string(),
            details,
        }
    }
}

impl IntoResponse for ControllerError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.error_response())).into_response()
    }
}

impl From<JsonRejection> for ControllerError {
    fn from(rejection: JsonRejection) -> Self {
        ControllerError::ValidationError(rejection.body_text())
    }
}
