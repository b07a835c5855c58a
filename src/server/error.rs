//! HTTP response conversion for [`VaultError`].

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorKind, VaultError};

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_message: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            code: code.to_string(),
        }
    }
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Crypto => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Store => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "invalid_request",
            ErrorKind::Unauthorized => "session_expired",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Crypto => "crypto_error",
            ErrorKind::Store => "store_unavailable",
            ErrorKind::Internal => "server_error",
        }
    }
}

impl IntoResponse for VaultError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let message = match kind {
            ErrorKind::Store => {
                tracing::error!(error = %self, "store error");
                "The credential store is temporarily unavailable".to_string()
            }
            ErrorKind::Internal => {
                tracing::error!(error = %self, "internal error");
                "An internal error occurred".to_string()
            }
            ErrorKind::Crypto => {
                tracing::warn!(error = %self, "crypto failure");
                self.to_string()
            }
            _ => {
                tracing::debug!(error = %self, "request rejected");
                self.to_string()
            }
        };

        (kind.status(), Json(ErrorResponse::new(kind.code(), message))).into_response()
    }
}

impl From<JsonRejection> for VaultError {
    fn from(rejection: JsonRejection) -> Self {
        VaultError::InvalidPayload(rejection.body_text())
    }
}
