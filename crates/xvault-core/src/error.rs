//! Per-subsystem error enums. Each public operation in this crate returns
//! one of these rather than a shared catch-all, so callers at the HTTP
//! boundary can match on variants instead of string-sniffing messages.

use uuid::Uuid;

/// Failures from the crypto subsystem (C3): key wrapping, ECIES, password
/// hashing.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key material: {reason}")]
    InvalidKeyMaterial { reason: String },

    #[error("authentication failed: {reason}")]
    CryptoAuth { reason: String },

    #[error("ciphertext too short: expected at least {expected} bytes, got {actual}")]
    CiphertextTooShort { expected: usize, actual: usize },

    #[error("key derivation failed: {reason}")]
    KeyDerivation { reason: String },
}

/// Failures from the auth subsystem (C4): registration, login, session
/// lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("email already in use")]
    EmailInUse,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("invalid or expired refresh token")]
    InvalidRefresh,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// Failures from the worker registry (C5).
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker {id} not found")]
    NotFound { id: Uuid },

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// Failures from the job queue (C6).
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job {id} not found")]
    NotFound { id: Uuid },

    #[error("no claimable work")]
    NoWork,

    #[error("conflict: {reason}")]
    Conflict { reason: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// Failures from the schedule engine (C7).
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("schedule {id} not found")]
    NotFound { id: Uuid },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("invalid cron expression: {reason}")]
    InvalidCron { reason: String },

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// Failures from the retention engine (C8).
#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error("invalid retention policy: {reason}")]
    InvalidPolicy { reason: String },

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// Failures from snapshot ingestion (C9).
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot {id} not found")]
    NotFound { id: Uuid },

    #[error("invalid locator: {reason}")]
    InvalidLocator { reason: String },

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}
