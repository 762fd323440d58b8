//! Log sink (C10).
//!
//! The customer-visible, DB-persisted sink. Distinct from `tracing`'s
//! operator-visible stdout stream — both exist simultaneously, mirroring
//! the teacher's file/DB audit backend alongside its `tracing` calls
//! throughout `main.rs`. Entity references (`worker_id`, `job_id`, ...) are
//! free-form text, not enforced foreign keys, so a log may outlive or
//! precede the row it refers to.

use sqlx::PgPool;
use uuid::Uuid;

use crate::clock;
use crate::models::{LogEntry, LogLevel};

/// Ingest a single log entry.
///
/// # Errors
///
/// Returns [`sqlx::Error`] on storage failure.
#[allow(clippy::too_many_arguments)]
pub async fn ingest(
    pool: &PgPool,
    level: LogLevel,
    message: &str,
    worker_id: Option<&str>,
    job_id: Option<&str>,
    snapshot_id: Option<&str>,
    source_id: Option<&str>,
    schedule_id: Option<&str>,
) -> Result<LogEntry, sqlx::Error> {
    let entry = sqlx::query_as::<_, LogEntry>(
        r"INSERT INTO logs (id, timestamp, level, message, worker_id, job_id, snapshot_id, source_id, schedule_id)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
          RETURNING *",
    )
    .bind(clock::new_id())
    .bind(clock::now())
    .bind(level.to_string())
    .bind(message)
    .bind(worker_id)
    .bind(job_id)
    .bind(snapshot_id)
    .bind(source_id)
    .bind(schedule_id)
    .fetch_one(pool)
    .await?;

    Ok(entry)
}

/// Record a lease recovery against a job, the one log line §4.4 names
/// explicitly ("appends a `lease-recovered` log").
///
/// # Errors
///
/// Returns [`sqlx::Error`] on storage failure.
pub async fn lease_recovered(pool: &PgPool, job_id: Uuid) -> Result<LogEntry, sqlx::Error> {
    ingest(
        pool,
        LogLevel::Warn,
        "lease-recovered",
        None,
        Some(&job_id.to_string()),
        None,
        None,
        None,
    )
    .await
}

/// Recent log entries, newest first, optionally filtered by level.
///
/// # Errors
///
/// Returns [`sqlx::Error`] on storage failure.
pub async fn recent(pool: &PgPool, level: Option<LogLevel>, limit: i64) -> Result<Vec<LogEntry>, sqlx::Error> {
    let entries = match level {
        Some(level) => {
            sqlx::query_as::<_, LogEntry>(
                "SELECT * FROM logs WHERE level = $1 ORDER BY timestamp DESC LIMIT $2",
            )
            .bind(level.to_string())
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, LogEntry>("SELECT * FROM logs ORDER BY timestamp DESC LIMIT $1")
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
    };

    Ok(entries)
}
