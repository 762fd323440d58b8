//! Retention engine (C8).
//!
//! A declarative keep-set policy evaluated per source against its
//! completed snapshots, oldest-first. Deletion candidates are emitted as
//! pinned `delete_snapshot` jobs; the guard against double-enqueueing a
//! deletion for the same snapshot lives in the same `INSERT` that creates
//! the job, via a `NOT EXISTS` subquery — not a separate check-then-act.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::clock;
use crate::error::RetentionError;
use crate::models::{JobType, RetentionPolicy, Snapshot};

/// Evaluate a keep-set policy against an ordered (oldest-first) list of
/// completed snapshots, returning the ids of deletion candidates. Failed
/// snapshots must be filtered out by the caller before calling this — the
/// policy only ever reasons about completed ones.
#[must_use]
pub fn evaluate_keep_set(policy: &RetentionPolicy, snapshots_oldest_first: &[Snapshot], now: DateTime<Utc>) -> Vec<Uuid> {
    match policy {
        RetentionPolicy::All => Vec::new(),
        RetentionPolicy::LatestN { keep_last_n } => {
            let keep = *keep_last_n as usize;
            let total = snapshots_oldest_first.len();
            if total <= keep {
                Vec::new()
            } else {
                snapshots_oldest_first[..total - keep]
                    .iter()
                    .map(|s| s.id)
                    .collect()
            }
        }
        RetentionPolicy::WithinDuration {
            keep_within_duration_secs,
        } => {
            let cutoff = now - Duration::seconds(*keep_within_duration_secs);
            snapshots_oldest_first
                .iter()
                .filter(|s| s.created_at < cutoff)
                .map(|s| s.id)
                .collect()
        }
    }
}

/// Run one retention pass for a single source: fetch its completed
/// snapshots, evaluate the policy, and emit a pinned `delete_snapshot` job
/// per candidate that doesn't already have a pending/running deletion.
///
/// # Errors
///
/// Returns [`RetentionError::InvalidPolicy`] if `retention_policy` doesn't
/// parse, or a storage error otherwise.
pub async fn run_for_source(
    pool: &PgPool,
    tenant_id: Uuid,
    source_id: Uuid,
    retention_policy: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>, RetentionError> {
    let policy: RetentionPolicy =
        serde_json::from_value(retention_policy.clone()).map_err(|e| RetentionError::InvalidPolicy {
            reason: e.to_string(),
        })?;

    if matches!(policy, RetentionPolicy::All) {
        return Ok(Vec::new());
    }

    let snapshots = sqlx::query_as::<_, Snapshot>(
        r"SELECT * FROM snapshots
          WHERE tenant_id = $1 AND source_id = $2 AND status = 'completed'
          ORDER BY created_at ASC",
    )
    .bind(tenant_id)
    .bind(source_id)
    .fetch_all(pool)
    .await?;

    let candidates = evaluate_keep_set(&policy, &snapshots, now);
    let mut enqueued = Vec::with_capacity(candidates.len());

    for snapshot in &snapshots {
        if !candidates.contains(&snapshot.id) {
            continue;
        }

        let inserted = sqlx::query_scalar::<_, Option<Uuid>>(
            r"INSERT INTO jobs (id, tenant_id, source_id, job_type, status, priority, target_worker_id, attempt, payload)
              SELECT $1, $2, $3, $4, 'queued', 0, $5, 0, $6
              WHERE NOT EXISTS (
                  SELECT 1 FROM jobs
                  WHERE job_type = 'delete_snapshot'
                    AND status IN ('queued', 'running')
                    AND payload->>'snapshot_id' = $7
              )
              RETURNING id",
        )
        .bind(clock::new_id())
        .bind(tenant_id)
        .bind(source_id)
        .bind(JobType::DeleteSnapshot.to_string())
        .bind(snapshot.worker_id)
        .bind(json!({ "snapshot_id": snapshot.id }))
        .bind(snapshot.id.to_string())
        .fetch_optional(pool)
        .await?
        .flatten();

        if let Some(job_id) = inserted {
            enqueued.push(job_id);
        }
    }

    Ok(enqueued)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn snap(id: Uuid, created_at: DateTime<Utc>) -> Snapshot {
        Snapshot {
            id,
            tenant_id: Uuid::nil(),
            source_id: Uuid::nil(),
            job_id: Uuid::nil(),
            status: "completed".to_owned(),
            size_bytes: Some(1),
            started_at: Some(created_at),
            finished_at: Some(created_at),
            manifest: json!({}),
            encryption_algorithm: "x25519-aes256gcm".to_owned(),
            encryption_recipient: "deadbeef".to_owned(),
            storage_backend: "local_fs".to_owned(),
            worker_id: Uuid::nil(),
            local_path: Some("/x".to_owned()),
            bucket: None,
            object_key: None,
            etag: None,
            download_token: None,
            download_expires_at: None,
            download_url: None,
            created_at,
        }
    }

    #[test]
    fn all_policy_keeps_everything() {
        let now = Utc::now();
        let snaps = vec![snap(Uuid::new_v4(), now), snap(Uuid::new_v4(), now)];
        let candidates = evaluate_keep_set(&RetentionPolicy::All, &snaps, now);
        assert!(candidates.is_empty());
    }

    #[test]
    fn latest_n_keeps_newest_and_deletes_rest() {
        let now = Utc::now();
        let old = snap(Uuid::new_v4(), now - Duration::days(3));
        let mid = snap(Uuid::new_v4(), now - Duration::days(2));
        let new = snap(Uuid::new_v4(), now - Duration::days(1));
        let snaps = vec![old.clone(), mid.clone(), new.clone()];

        let candidates = evaluate_keep_set(&RetentionPolicy::LatestN { keep_last_n: 1 }, &snaps, now);
        assert_eq!(candidates, vec![old.id, mid.id]);
    }

    #[test]
    fn latest_n_keeps_all_when_fewer_than_n() {
        let now = Utc::now();
        let snaps = vec![snap(Uuid::new_v4(), now)];
        let candidates = evaluate_keep_set(&RetentionPolicy::LatestN { keep_last_n: 5 }, &snaps, now);
        assert!(candidates.is_empty());
    }

    #[test]
    fn within_duration_deletes_only_older_than_cutoff() {
        let now = Utc::now();
        let old = snap(Uuid::new_v4(), now - Duration::days(10));
        let fresh = snap(Uuid::new_v4(), now - Duration::hours(1));
        let snaps = vec![old.clone(), fresh];

        let candidates = evaluate_keep_set(
            &RetentionPolicy::WithinDuration {
                keep_within_duration_secs: Duration::days(1).num_seconds(),
            },
            &snaps,
            now,
        );
        assert_eq!(candidates, vec![old.id]);
    }
}
