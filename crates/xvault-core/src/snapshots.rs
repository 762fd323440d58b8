//! Snapshot registry (C9).
//!
//! Snapshot ingestion validates the locator/backend pairing and inserts
//! the row in the same transaction that marks the originating job
//! complete — atomicity here is by construction, not a check-then-act.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::clock;
use crate::error::SnapshotError;
use crate::jobs;
use crate::models::{JobType, Locator, Snapshot, SnapshotResult, StorageBackend};

/// Validate that `result.locator`'s backend variant is internally
/// consistent, then insert the snapshot row and mark the job completed
/// within one transaction.
///
/// # Errors
///
/// Returns [`SnapshotError::InvalidLocator`] if the locator's fields don't
/// match its backend, or a storage error otherwise (including
/// [`JobError::Conflict`] surfaced as a storage error if the job was not
/// running).
pub async fn ingest(
    pool: &PgPool,
    tenant_id: Uuid,
    source_id: Uuid,
    job_id: Uuid,
    result: SnapshotResult,
) -> Result<Snapshot, SnapshotError> {
    let (storage_backend, worker_id, local_path, bucket, object_key, etag) = match &result.locator {
        Locator::LocalFs { worker_id, local_path } => (
            StorageBackend::LocalFs,
            *worker_id,
            Some(local_path.clone()),
            None,
            None,
            None,
        ),
        Locator::S3 {
            worker_id,
            bucket,
            object_key,
            etag,
        } => (
            StorageBackend::S3,
            *worker_id,
            None,
            Some(bucket.clone()),
            Some(object_key.clone()),
            Some(etag.clone()),
        ),
    };

    if storage_backend == StorageBackend::LocalFs && local_path.is_none() {
        return Err(SnapshotError::InvalidLocator {
            reason: "local_fs locator requires local_path".to_owned(),
        });
    }
    if storage_backend == StorageBackend::S3 && (bucket.is_none() || object_key.is_none()) {
        return Err(SnapshotError::InvalidLocator {
            reason: "s3 locator requires bucket and object_key".to_owned(),
        });
    }

    let mut tx = pool.begin().await?;

    sqlx::query_as::<_, crate::models::Job>(
        r"UPDATE jobs SET status = 'completed', finished_at = $2
          WHERE id = $1 AND status = 'running'
          RETURNING *",
    )
    .bind(job_id)
    .bind(clock::now())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| SnapshotError::InvalidLocator {
        reason: format!("job {job_id} is not running"),
    })?;

    let snapshot = sqlx::query_as::<_, Snapshot>(
        r"INSERT INTO snapshots
              (id, tenant_id, source_id, job_id, status, size_bytes, started_at, finished_at,
               manifest, encryption_algorithm, encryption_recipient, storage_backend, worker_id,
               local_path, bucket, object_key, etag)
          VALUES ($1, $2, $3, $4, 'completed', $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
          RETURNING *",
    )
    .bind(result.snapshot_id)
    .bind(tenant_id)
    .bind(source_id)
    .bind(job_id)
    .bind(result.size_bytes)
    .bind(result.started_at)
    .bind(result.finished_at)
    .bind(result.manifest)
    .bind(result.encryption_algorithm)
    .bind(result.encryption_recipient)
    .bind(storage_backend.to_string())
    .bind(worker_id)
    .bind(local_path)
    .bind(bucket)
    .bind(object_key)
    .bind(etag)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(snapshot)
}

/// Fetch a snapshot by id, for restore-job creation and download-token
/// population.
///
/// # Errors
///
/// Returns [`SnapshotError::NotFound`] if no such snapshot exists.
pub async fn get_snapshot(pool: &PgPool, id: Uuid) -> Result<Snapshot, SnapshotError> {
    sqlx::query_as::<_, Snapshot>("SELECT * FROM snapshots WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(SnapshotError::NotFound { id })
}

/// Emit a `restore` job carrying the snapshot's locator, pinned to the
/// worker (or restore service) that owns the artifact.
///
/// # Errors
///
/// Returns [`SnapshotError::NotFound`] if the snapshot doesn't exist.
pub async fn create_restore_job(pool: &PgPool, snapshot_id: Uuid) -> Result<Uuid, SnapshotError> {
    let snapshot = get_snapshot(pool, snapshot_id).await?;

    let job = jobs::enqueue(
        pool,
        snapshot.tenant_id,
        JobType::Restore,
        Some(snapshot.source_id),
        serde_json::json!({
            "snapshot_id": snapshot.id,
            "storage_backend": snapshot.storage_backend,
            "local_path": snapshot.local_path,
            "bucket": snapshot.bucket,
            "object_key": snapshot.object_key,
            "etag": snapshot.etag,
        }),
        0,
        Some(snapshot.worker_id),
    )
    .await
    .map_err(|e| SnapshotError::InvalidLocator {
        reason: e.to_string(),
    })?;

    Ok(job.id)
}

/// Populate a time-bound download token on a snapshot, as reported by the
/// restore service. The registry only persists these fields — access
/// control via the token is enforced at the HTTP boundary, not here.
///
/// # Errors
///
/// Returns [`SnapshotError::NotFound`] if no such snapshot exists.
pub async fn set_download_token(
    pool: &PgPool,
    snapshot_id: Uuid,
    download_token: &str,
    download_expires_at: chrono::DateTime<Utc>,
    download_url: &str,
) -> Result<Snapshot, SnapshotError> {
    sqlx::query_as::<_, Snapshot>(
        r"UPDATE snapshots SET download_token = $2, download_expires_at = $3, download_url = $4
          WHERE id = $1
          RETURNING *",
    )
    .bind(snapshot_id)
    .bind(download_token)
    .bind(download_expires_at)
    .bind(download_url)
    .fetch_optional(pool)
    .await?
    .ok_or(SnapshotError::NotFound { id: snapshot_id })
}

/// Remove a snapshot row after its `delete_snapshot` job has succeeded.
/// Logs referencing the id survive — the log relation is intentionally
/// non-enforcing.
///
/// # Errors
///
/// Returns [`SnapshotError::NotFound`] if no such snapshot exists.
pub async fn delete_snapshot(pool: &PgPool, id: Uuid) -> Result<(), SnapshotError> {
    let result = sqlx::query("DELETE FROM snapshots WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(SnapshotError::NotFound { id });
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn locator_variants_carry_distinct_backends() {
        let local = Locator::LocalFs {
            worker_id: Uuid::new_v4(),
            local_path: "/data/snap".to_owned(),
        };
        let s3 = Locator::S3 {
            worker_id: Uuid::new_v4(),
            bucket: "backups".to_owned(),
            object_key: "snap.tar.zst.enc".to_owned(),
            etag: "abc123".to_owned(),
        };
        assert!(matches!(local, Locator::LocalFs { .. }));
        assert!(matches!(s3, Locator::S3 { .. }));
    }
}
