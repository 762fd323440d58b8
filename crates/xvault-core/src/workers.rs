//! Worker / service registry (C5).
//!
//! Plain repository functions over `workers` and a parallel
//! `restore_services` table for the "distinct `type=\"restore\"`"
//! registration surface. Health derivation is a pure function, never
//! consulted by the job queue itself — only surfaced to the admin UI.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::clock;
use crate::error::WorkerError;
use crate::models::{RestoreService, Worker, WorkerHealth, WorkerStatus};

/// Recommended heartbeat cadence, used as the default basis for health
/// derivation when a caller doesn't supply its own interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::seconds(30);

/// Register (or re-register) a worker: upsert on `id`, setting status
/// `online` and refreshing `last_seen_at`.
///
/// # Errors
///
/// Returns an error on storage failure.
pub async fn register(
    pool: &PgPool,
    worker_id: Uuid,
    name: &str,
    storage_base_path: &str,
    capabilities: Value,
) -> Result<Worker, WorkerError> {
    let worker = sqlx::query_as::<_, Worker>(
        r"INSERT INTO workers (id, name, status, capabilities, storage_base_path, last_seen_at, system_metrics)
          VALUES ($1, $2, $3, $4, $5, $6, '{}'::jsonb)
          ON CONFLICT (id) DO UPDATE SET
              name = EXCLUDED.name,
              status = EXCLUDED.status,
              capabilities = EXCLUDED.capabilities,
              storage_base_path = EXCLUDED.storage_base_path,
              last_seen_at = EXCLUDED.last_seen_at
          RETURNING *",
    )
    .bind(worker_id)
    .bind(name)
    .bind(WorkerStatus::Online.to_string())
    .bind(capabilities)
    .bind(storage_base_path)
    .bind(clock::now())
    .fetch_one(pool)
    .await?;

    Ok(worker)
}

/// Record a heartbeat: overwrite status, refresh `last_seen_at`, and
/// shallow-merge the supplied metrics blob into the stored one.
///
/// # Errors
///
/// Returns [`WorkerError::NotFound`] if no worker with `worker_id` exists.
pub async fn heartbeat(
    pool: &PgPool,
    worker_id: Uuid,
    status: WorkerStatus,
    system_metrics: Option<Value>,
) -> Result<Worker, WorkerError> {
    let metrics = system_metrics.unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    let worker = sqlx::query_as::<_, Worker>(
        r"UPDATE workers SET
              status = $2,
              last_seen_at = $3,
              system_metrics = system_metrics || $4
          WHERE id = $1
          RETURNING *",
    )
    .bind(worker_id)
    .bind(status.to_string())
    .bind(clock::now())
    .bind(metrics)
    .fetch_optional(pool)
    .await?
    .ok_or(WorkerError::NotFound { id: worker_id })?;

    Ok(worker)
}

/// Look up a worker by id, used to resolve routing for pinned jobs.
///
/// # Errors
///
/// Returns [`WorkerError::NotFound`] if no such worker exists.
pub async fn get_worker(pool: &PgPool, id: Uuid) -> Result<Worker, WorkerError> {
    sqlx::query_as::<_, Worker>("SELECT * FROM workers WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(WorkerError::NotFound { id })
}

/// Register a restore service. Shares lifecycle semantics with workers but
/// lives in its own table — it is never a candidate for backup-job
/// routing.
///
/// # Errors
///
/// Returns an error on storage failure.
pub async fn register_restore_service(
    pool: &PgPool,
    service_id: Uuid,
    name: &str,
) -> Result<RestoreService, WorkerError> {
    let service = sqlx::query_as::<_, RestoreService>(
        r"INSERT INTO restore_services (id, name, status, last_seen_at)
          VALUES ($1, $2, $3, $4)
          ON CONFLICT (id) DO UPDATE SET
              name = EXCLUDED.name,
              status = EXCLUDED.status,
              last_seen_at = EXCLUDED.last_seen_at
          RETURNING *",
    )
    .bind(service_id)
    .bind(name)
    .bind(WorkerStatus::Online.to_string())
    .bind(clock::now())
    .fetch_one(pool)
    .await?;

    Ok(service)
}

/// Heartbeat for a restore service, mirroring [`heartbeat`].
///
/// # Errors
///
/// Returns [`WorkerError::NotFound`] if no such restore service exists.
pub async fn heartbeat_restore_service(
    pool: &PgPool,
    service_id: Uuid,
    status: WorkerStatus,
) -> Result<RestoreService, WorkerError> {
    let service = sqlx::query_as::<_, RestoreService>(
        r"UPDATE restore_services SET status = $2, last_seen_at = $3
          WHERE id = $1
          RETURNING *",
    )
    .bind(service_id)
    .bind(status.to_string())
    .bind(clock::now())
    .fetch_optional(pool)
    .await?
    .ok_or(WorkerError::NotFound { id: service_id })?;

    Ok(service)
}

/// Derive admin-facing health from raw state. A pure function, unit-tested
/// without a database and never consulted by the job queue's routing
/// decisions — those only look at `status`/`target_worker_id`.
#[must_use]
pub fn derive_health(
    status: WorkerStatus,
    last_seen_at: DateTime<Utc>,
    now: DateTime<Utc>,
    heartbeat_interval: Duration,
) -> WorkerHealth {
    if status != WorkerStatus::Online {
        return WorkerHealth::Offline;
    }

    let age = now - last_seen_at;
    if age <= heartbeat_interval * 2 {
        WorkerHealth::Healthy
    } else if age <= heartbeat_interval * 5 {
        WorkerHealth::Warning
    } else {
        WorkerHealth::Critical
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn offline_worker_is_offline_regardless_of_last_seen() {
        let now = Utc::now();
        let health = derive_health(WorkerStatus::Offline, now, now, DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(health, WorkerHealth::Offline);
    }

    #[test]
    fn fresh_heartbeat_is_healthy() {
        let now = Utc::now();
        let last_seen = now - Duration::seconds(10);
        let health = derive_health(WorkerStatus::Online, last_seen, now, DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(health, WorkerHealth::Healthy);
    }

    #[test]
    fn stale_within_five_intervals_is_warning() {
        let now = Utc::now();
        let last_seen = now - Duration::seconds(120);
        let health = derive_health(WorkerStatus::Online, last_seen, now, DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(health, WorkerHealth::Warning);
    }

    #[test]
    fn very_stale_online_worker_is_critical() {
        let now = Utc::now();
        let last_seen = now - Duration::seconds(600);
        let health = derive_health(WorkerStatus::Online, last_seen, now, DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(health, WorkerHealth::Critical);
    }

    #[test]
    fn boundary_at_exactly_two_intervals_is_healthy() {
        let now = Utc::now();
        let last_seen = now - (DEFAULT_HEARTBEAT_INTERVAL * 2);
        let health = derive_health(WorkerStatus::Online, last_seen, now, DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(health, WorkerHealth::Healthy);
    }
}
