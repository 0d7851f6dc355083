use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Data-access error classification for the API boundary
pub mod classify;

pub use classify::{build_error_response, classify_db_error, ErrorClassification, ErrorFallback};

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "message": "Already exists.",
    "code": "ALREADY_EXISTS"
}))]
pub struct ErrorBody {
    /// Human-readable, non-technical description
    #[schema(example = "Already exists.")]
    pub message: String,
    /// Stable machine-readable code, omitted when the failure has none
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "ALREADY_EXISTS")]
    pub code: Option<String>,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Missing signature header")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    #[error("Currency mismatch: wallet {wallet}, request {request}")]
    CurrencyMismatch { wallet: String, request: String },

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Webhook processing failed: {0}")]
    WebhookProcessing(String),

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(err) => classify_db_error(err).status,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidStatus(_)
            | Self::BadRequest(_)
            | Self::MissingSignature
            | Self::InvalidCurrency(_)
            | Self::InsufficientFunds(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) | Self::CurrencyMismatch { .. } => StatusCode::CONFLICT,
            Self::WebhookProcessing(_)
            | Self::EncryptionError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the status comes from the error itself rather than a caller fallback.
    pub(crate) fn has_intrinsic_status(&self) -> bool {
        !matches!(self, Self::InternalError(_) | Self::Other(_))
    }

    /// Stable code surfaced to API clients, if the error carries one.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::DatabaseError(err) => classify_db_error(err).code,
            Self::NotFound(_) | Self::InternalError(_) | Self::Other(_) => None,
            Self::ValidationError(_) => Some("VALIDATION_ERROR"),
            Self::InvalidStatus(_) => Some("INVALID_STATUS"),
            Self::BadRequest(_) => Some("BAD_REQUEST"),
            Self::Conflict(_) => Some("CONFLICT"),
            Self::Unauthorized(_) => Some("UNAUTHORIZED"),
            Self::Forbidden(_) => Some("FORBIDDEN"),
            Self::MissingSignature => Some("MISSING_SIGNATURE"),
            Self::InvalidSignature => Some("INVALID_SIGNATURE"),
            Self::InvalidCurrency(_) => Some("INVALID_CURRENCY"),
            Self::CurrencyMismatch { .. } => Some("CURRENCY_MISMATCH"),
            Self::InsufficientFunds(_) => Some("INSUFFICIENT_FUNDS"),
            Self::WebhookProcessing(_) => Some("WEBHOOK_PROCESSING_FAILED"),
            Self::EncryptionError(_) => Some("ENCRYPTION_ERROR"),
            Self::SerializationError(_) => Some("SERIALIZATION_ERROR"),
        }
    }

    /// Message that is safe to show a client for 4xx failures.
    /// 5xx failures never reach clients with this text.
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::ValidationError(msg)
            | Self::InvalidStatus(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::InvalidCurrency(msg)
            | Self::InsufficientFunds(msg) => msg.clone(),
            Self::CurrencyMismatch { .. } => {
                "Request currency does not match wallet currency.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let classified = build_error_response(&self, &ErrorFallback::default());

        if classified.status.is_server_error() {
            tracing::error!(
                request_id = ?crate::tracing::current_request_id(),
                error = %self,
                "request failed"
            );
        } else {
            tracing::debug!(status = %classified.status, error = %self, "request rejected");
        }

        (classified.status, Json(classified.into_body())).into_response()
    }
}

pub type AppError = ServiceError;
