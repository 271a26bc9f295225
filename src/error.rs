use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Errors raised by a reminder store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Todo not found: {0}")]
    NotFound(String),
}

/// Errors raised while obtaining a gateway credential.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Failed to sign service account assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Token exchange request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Token exchange rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

/// Transport-level failure of a single gateway call.
///
/// HTTP error statuses are not errors here; they are reported as status codes.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway request timed out")]
    Timeout,

    #[error("Gateway request failed: {0}")]
    Request(reqwest::Error),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Request(e)
        }
    }
}

/// Invocation-level failure. Nothing in the batch has been touched when one of
/// these is returned.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to select due todos: {0}")]
    Selection(#[source] StoreError),

    #[error("Failed to authenticate with the messaging gateway: {0}")]
    Authentication(#[source] AuthError),
}

/// Errors surfaced by the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Dispatch(e) => {
                tracing::error!("Dispatch failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
pub type StoreResult<T> = Result<T, StoreError>;
