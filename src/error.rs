//! # Error Handling
//!
//! One application error type, converted into an HTTP response at the edge.
//!
//! The mapping follows a simple rule: anything the client can act on
//! (unknown user, no pending challenge) is reported as-is, while every
//! WebAuthn verification failure collapses into the same generic message.
//! The specific reason is only written to the server log, so an attacker
//! probing the endpoints cannot learn which check tripped.

use crate::webauthn::error::VerifyError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// SQLx errors from the SQLite store
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A response failed one of the WebAuthn protocol or cryptographic checks
    #[error("Verification failed: {0}")]
    Verification(#[from] VerifyError),

    /// JSON (de)serialization of stored data failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unknown user or credential (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A finish call arrived with no matching challenge outstanding
    #[error("No pending challenge")]
    NoPendingChallenge,

    /// Malformed client input (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unexpected server-side failure (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Verification(e) => {
                // The reason stays in the log; the client gets the same
                // answer for every failed check.
                tracing::warn!(reason = %e, "WebAuthn verification failed");
                (StatusCode::BAD_REQUEST, "Verification failed".to_string())
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Serialization error".to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::NoPendingChallenge => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Rejected request body");
        AppError::BadRequest("Invalid JSON body".to_string())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Rejected query string");
        AppError::BadRequest("Invalid query string".to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
