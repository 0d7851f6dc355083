//! Maps data-access failures onto stable `{status, message, code}` triples.
//!
//! Low-level errors are classified exactly once, here, at the HTTP boundary. Nothing above this
//! module inspects `DbErr` text, and nothing below it builds response bodies.

use axum::http::StatusCode;
use sea_orm::{error::DbErr, SqlErr};

use super::{ErrorBody, ServiceError};

const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again later.";

/// Result of classifying an error for the API boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassification {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<&'static str>,
}

impl ErrorClassification {
    fn fixed(status: StatusCode, message: &str, code: &'static str) -> Self {
        Self {
            status,
            message: message.to_string(),
            code: Some(code),
        }
    }

    pub fn into_body(self) -> ErrorBody {
        ErrorBody {
            message: self.message,
            code: self.code.map(str::to_string),
        }
    }
}

/// Explicit status/code/message a caller may supply for errors the fixed table does not cover.
#[derive(Debug, Clone, Default)]
pub struct ErrorFallback {
    pub status: Option<StatusCode>,
    pub code: Option<&'static str>,
    pub message: Option<String>,
}

impl ErrorFallback {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Fixed mapping table for persistence failures.
///
/// | failure              | status | code              |
/// |----------------------|--------|-------------------|
/// | validation           | 400    | VALIDATION_ERROR  |
/// | unique violation     | 409    | ALREADY_EXISTS    |
/// | foreign-key violation| 400    | INVALID_REFERENCE |
/// | anything else        | 500    | DATABASE_ERROR    |
pub fn classify_db_error(err: &DbErr) -> ErrorClassification {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            return ErrorClassification::fixed(
                StatusCode::CONFLICT,
                "Already exists.",
                "ALREADY_EXISTS",
            );
        }
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
            return ErrorClassification::fixed(
                StatusCode::BAD_REQUEST,
                "Invalid reference.",
                "INVALID_REFERENCE",
            );
        }
        _ => {}
    }

    match err {
        DbErr::Type(_) | DbErr::Json(_) | DbErr::AttrNotSet(_) | DbErr::TryIntoErr { .. } => {
            ErrorClassification::fixed(
                StatusCode::BAD_REQUEST,
                "Invalid data provided.",
                "VALIDATION_ERROR",
            )
        }
        // Schema and query detail stays in the logs.
        _ => ErrorClassification::fixed(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server configuration error. Please try again later.",
            "DATABASE_ERROR",
        ),
    }
}

/// True when the error is a uniqueness violation raised by the database.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Builds the boundary response for any service error.
///
/// Database errors go through the fixed table. Everything else keeps its own status when it
/// has one, otherwise the fallback status (default 500). The message is the fallback message if
/// supplied; failing that, 5xx responses get a generic sentence and 4xx responses surface the
/// error's own public message.
pub fn build_error_response(err: &ServiceError, fallback: &ErrorFallback) -> ErrorClassification {
    if let ServiceError::DatabaseError(db_err) = err {
        return classify_db_error(db_err);
    }

    let status = if err.has_intrinsic_status() {
        err.status_code()
    } else {
        fallback.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    };
    let code = err.error_code().or(fallback.code);

    let message = match &fallback.message {
        Some(message) => message.clone(),
        None if status.is_server_error() => GENERIC_FAILURE_MESSAGE.to_string(),
        None => err.public_message(),
    };

    ErrorClassification {
        status,
        message,
        code,
    }
}
