//! Schedule engine (C7).
//!
//! `next_run_at` advancement and job promotion happen in one transaction —
//! a crashed promotion can never silently skip or double-enqueue a
//! schedule. Cron evaluation uses the `cron` crate against the schedule's
//! IANA timezone via `chrono-tz`; interval schedules advance by
//! `now + interval_minutes`. A schedule more than one period behind `now`
//! catches up in a single jump — `next_run_at` is recomputed once from
//! `now`, never backfilled tick-by-tick.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::clock;
use crate::error::ScheduleError;
use crate::jobs;
use crate::models::{JobType, Schedule};

/// Compute the next run time for a cron expression evaluated in `tz`,
/// strictly after `from`.
///
/// # Errors
///
/// Returns [`ScheduleError::InvalidCron`] if the expression does not
/// parse, or has no occurrence after `from`.
pub fn next_cron_run(cron_expr: &str, tz: Tz, from: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    let schedule = CronSchedule::from_str(cron_expr).map_err(|e| ScheduleError::InvalidCron {
        reason: e.to_string(),
    })?;

    let from_tz = from.with_timezone(&tz);
    let next = schedule
        .after(&from_tz)
        .next()
        .ok_or_else(|| ScheduleError::InvalidCron {
            reason: "cron expression has no future occurrence".to_owned(),
        })?;

    Ok(next.with_timezone(&Utc))
}

/// Compute the next run time for an interval schedule: `from + minutes`.
#[must_use]
pub fn next_interval_run(minutes: i32, from: DateTime<Utc>) -> DateTime<Utc> {
    from + Duration::minutes(i64::from(minutes))
}

/// Recompute `next_run_at` for a schedule, catching up in a single jump
/// rather than backfilling every missed period.
///
/// # Errors
///
/// Returns [`ScheduleError::InvalidInput`] if neither `cron` nor
/// `interval_minutes` is set, or [`ScheduleError::InvalidCron`] if the cron
/// expression is malformed.
pub fn compute_next_run(schedule: &Schedule, now: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    match (&schedule.cron, schedule.interval_minutes) {
        (Some(expr), None) => {
            let tz: Tz = schedule.timezone.parse().map_err(|_| ScheduleError::InvalidInput {
                reason: format!("unknown timezone: {}", schedule.timezone),
            })?;
            next_cron_run(expr, tz, now)
        }
        (None, Some(minutes)) => Ok(next_interval_run(minutes, now)),
        _ => Err(ScheduleError::InvalidInput {
            reason: "exactly one of cron or interval_minutes must be set".to_owned(),
        }),
    }
}

/// Create a schedule, computing its initial `next_run_at`.
///
/// # Errors
///
/// Returns [`ScheduleError::InvalidInput`] if neither/both of `cron` and
/// `interval_minutes` are set.
pub async fn create_schedule(
    pool: &PgPool,
    tenant_id: Uuid,
    source_id: Uuid,
    cron: Option<String>,
    interval_minutes: Option<i32>,
    timezone: &str,
    retention_policy: serde_json::Value,
) -> Result<Schedule, ScheduleError> {
    if cron.is_some() == interval_minutes.is_some() {
        return Err(ScheduleError::InvalidInput {
            reason: "exactly one of cron or interval_minutes must be set".to_owned(),
        });
    }

    let now = clock::now();
    let placeholder = Schedule {
        id: Uuid::nil(),
        tenant_id,
        source_id,
        cron: cron.clone(),
        interval_minutes,
        timezone: timezone.to_owned(),
        status: "enabled".to_owned(),
        retention_policy: retention_policy.clone(),
        last_run_at: None,
        next_run_at: None,
        created_at: now,
        updated_at: now,
    };
    let next_run_at = compute_next_run(&placeholder, now)?;

    let schedule = sqlx::query_as::<_, Schedule>(
        r"INSERT INTO schedules
              (id, tenant_id, source_id, cron, interval_minutes, timezone, status, retention_policy, next_run_at)
          VALUES ($1, $2, $3, $4, $5, $6, 'enabled', $7, $8)
          RETURNING *",
    )
    .bind(clock::new_id())
    .bind(tenant_id)
    .bind(source_id)
    .bind(cron)
    .bind(interval_minutes)
    .bind(timezone)
    .bind(retention_policy)
    .bind(next_run_at)
    .fetch_one(pool)
    .await?;

    Ok(schedule)
}

/// One scheduler tick: promote every enabled schedule whose `next_run_at`
/// is due into a queued `backup` job, advancing `next_run_at` in the same
/// transaction as the enqueue. Returns the ids of jobs created.
///
/// # Errors
///
/// Returns an error on storage failure; a single schedule's cron/timezone
/// corruption is logged and skipped rather than aborting the whole tick.
pub async fn run_due_schedules(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<Uuid>, ScheduleError> {
    let due = sqlx::query_as::<_, Schedule>(
        r"SELECT * FROM schedules
          WHERE status = 'enabled' AND next_run_at <= $1
          ORDER BY next_run_at ASC",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;

    let mut enqueued = Vec::with_capacity(due.len());

    for schedule in due {
        match promote_one(pool, &schedule, now).await {
            Ok(job_id) => enqueued.push(job_id),
            Err(err) => {
                tracing::warn!(schedule_id = %schedule.id, error = %err, "skipping schedule with invalid next-run computation");
            }
        }
    }

    Ok(enqueued)
}

async fn promote_one(pool: &PgPool, schedule: &Schedule, now: DateTime<Utc>) -> Result<Uuid, ScheduleError> {
    let next_run_at = compute_next_run(schedule, now)?;

    let mut tx = pool.begin().await?;

    let job = jobs::enqueue_tx(
        &mut *tx,
        schedule.tenant_id,
        JobType::Backup,
        Some(schedule.source_id),
        json!({ "source_id": schedule.source_id, "schedule_id": schedule.id }),
        0,
        None,
    )
    .await
    .map_err(|e| ScheduleError::InvalidInput {
        reason: e.to_string(),
    })?;

    sqlx::query(
        r"UPDATE schedules SET last_run_at = $2, next_run_at = $3, updated_at = $2
          WHERE id = $1",
    )
    .bind(schedule.id)
    .bind(now)
    .bind(next_run_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(job.id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn interval_advances_by_minutes() {
        let from = Utc::now();
        let next = next_interval_run(30, from);
        assert_eq!(next, from + Duration::minutes(30));
    }

    #[test]
    fn cron_advances_to_next_minute() {
        let tz: Tz = "UTC".parse().unwrap();
        let from = Utc::now();
        let next = next_cron_run("0 * * * * *", tz, from).unwrap();
        assert!(next > from);
    }

    #[test]
    fn invalid_cron_expression_is_rejected() {
        let tz: Tz = "UTC".parse().unwrap();
        let err = next_cron_run("not a cron expr", tz, Utc::now()).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidCron { .. }));
    }

    #[test]
    fn compute_next_run_requires_exactly_one_of_cron_or_interval() {
        let now = Utc::now();
        let both = Schedule {
            id: Uuid::nil(),
            tenant_id: Uuid::nil(),
            source_id: Uuid::nil(),
            cron: Some("0 * * * * *".to_owned()),
            interval_minutes: Some(5),
            timezone: "UTC".to_owned(),
            status: "enabled".to_owned(),
            retention_policy: json!({"mode": "all"}),
            last_run_at: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(compute_next_run(&both, now).is_err());

        let neither = Schedule {
            cron: None,
            interval_minutes: None,
            ..both
        };
        assert!(compute_next_run(&neither, now).is_err());
    }

    #[test]
    fn catch_up_is_a_single_jump_not_a_backfill() {
        let now = Utc::now();
        let far_behind = Schedule {
            id: Uuid::nil(),
            tenant_id: Uuid::nil(),
            source_id: Uuid::nil(),
            cron: None,
            interval_minutes: Some(5),
            timezone: "UTC".to_owned(),
            status: "enabled".to_owned(),
            retention_policy: json!({"mode": "all"}),
            last_run_at: None,
            next_run_at: Some(now - Duration::days(30)),
            created_at: now,
            updated_at: now,
        };
        // compute_next_run always advances from `now`, not from the stale
        // next_run_at, so it never produces a backlog of catch-up ticks.
        let next = compute_next_run(&far_behind, now).unwrap();
        assert_eq!(next, now + Duration::minutes(5));
    }
}
