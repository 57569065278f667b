use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::contracts::RenderError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failure taxonomy of the fulfillment pipeline.
///
/// `Authentication`, `InvalidPayload` and `BuyerResolution` are fatal for the
/// whole event. The remaining variants are recovered per line item and end up
/// as `StepOutcome::Failed` entries in the fulfillment report.
#[derive(Error, Debug)]
pub enum FulfillmentError {
    #[error("Webhook authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Buyer could not be resolved for session {session_id}")]
    BuyerResolution { session_id: String },

    #[error("Contract rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Blob storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Payment provider error: {0}")]
    Provider(String),
}

impl FulfillmentError {
    /// HTTP status reported back to the payment provider.
    ///
    /// 4xx tells the provider the delivery itself is bad, 5xx asks it to retry.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Authentication(_) | Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::BuyerResolution { .. }
            | Self::Render(_)
            | Self::Storage(_)
            | Self::Persistence(_)
            | Self::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for FulfillmentError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<r2d2::Error> for FulfillmentError {
    fn from(e: r2d2::Error) -> Self {
        Self::Persistence(format!("connection pool: {}", e))
    }
}

impl From<AppError> for FulfillmentError {
    fn from(e: AppError) -> Self {
        Self::Persistence(e.to_string())
    }
}

/// Error message constants shared by webhook parsing and tests.
pub mod msg {
    pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid signature format";
    pub const INVALID_TIMESTAMP_IN_SIGNATURE: &str = "Invalid timestamp in signature";
    pub const INVALID_WEBHOOK_SECRET: &str = "Invalid webhook secret";
    pub const SIGNATURE_MISMATCH: &str = "Signature does not match payload";
    pub const MISSING_SIGNATURE_HEADER: &str = "Missing stripe-signature header";
}
