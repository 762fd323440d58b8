//! HTTP error types for `xvault-server`.
//!
//! Maps domain errors from `xvault-core` into the HTTP taxonomy of the
//! specification. Every variant produces a JSON body with a machine-readable
//! `error` field and a human-readable `message`; no stack traces leak.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use xvault_core::error::{AuthError, CryptoError, JobError, RetentionError, ScheduleError, SnapshotError, WorkerError};

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Referenced entity missing.
    NotFound(String),
    /// Uniqueness or state-machine violation.
    Conflict(String),
    /// Schema/constraint violation.
    InvalidInput(String),
    /// Missing/invalid/expired/blacklisted token.
    Unauthorized(String),
    /// Role insufficient for the operation.
    Forbidden(String),
    /// Decrypt failed or signature mismatch — 500 to clients, logged with detail.
    CryptoAuth(String),
    /// Database/cache unavailable; callers may retry.
    Transient(String),
    /// Unclassified internal error.
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::CryptoAuth(msg) => {
                tracing::error!(error = %msg, "crypto authentication failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_owned())
            }
            Self::Transient(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_owned())
            }
        };

        (status, axum::Json(ErrorBody { error: message })).into_response()
    }
}

fn from_sqlx(err: &sqlx::Error) -> AppError {
    match err {
        sqlx::Error::RowNotFound => AppError::NotFound("resource not found".to_owned()),
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            AppError::Conflict("resource already exists".to_owned())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => AppError::Transient(err.to_string()),
        _ => AppError::Internal(err.to_string()),
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        from_sqlx(&err)
    }
}

impl From<CryptoError> for AppError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::CryptoAuth { .. } => Self::CryptoAuth(err.to_string()),
            CryptoError::InvalidKeyMaterial { .. }
            | CryptoError::CiphertextTooShort { .. }
            | CryptoError::KeyDerivation { .. } => Self::InvalidInput(err.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::EmailInUse => Self::Conflict(err.to_string()),
            AuthError::InvalidCredentials | AuthError::InvalidRefresh => Self::Unauthorized(err.to_string()),
            AuthError::Unauthorized(ref msg) => Self::Unauthorized(msg.clone()),
            AuthError::Crypto(inner) => inner.into(),
            AuthError::Storage(ref inner) => from_sqlx(inner),
        }
    }
}

impl From<WorkerError> for AppError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::NotFound { .. } => Self::NotFound(err.to_string()),
            WorkerError::Storage(ref inner) => from_sqlx(inner),
        }
    }
}

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound { .. } => Self::NotFound(err.to_string()),
            JobError::NoWork => Self::NotFound("no work available".to_owned()),
            JobError::Conflict { .. } => Self::Conflict(err.to_string()),
            JobError::InvalidInput { .. } => Self::InvalidInput(err.to_string()),
            JobError::Storage(ref inner) => from_sqlx(inner),
        }
    }
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::NotFound { .. } => Self::NotFound(err.to_string()),
            ScheduleError::InvalidInput { .. } | ScheduleError::InvalidCron { .. } => Self::InvalidInput(err.to_string()),
            ScheduleError::Storage(ref inner) => from_sqlx(inner),
        }
    }
}

impl From<RetentionError> for AppError {
    fn from(err: RetentionError) -> Self {
        match err {
            RetentionError::InvalidPolicy { .. } => Self::InvalidInput(err.to_string()),
            RetentionError::Storage(ref inner) => from_sqlx(inner),
        }
    }
}

impl From<SnapshotError> for AppError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::NotFound { .. } => Self::NotFound(err.to_string()),
            SnapshotError::InvalidLocator { .. } => Self::InvalidInput(err.to_string()),
            SnapshotError::Storage(ref inner) => from_sqlx(inner),
        }
    }
}
