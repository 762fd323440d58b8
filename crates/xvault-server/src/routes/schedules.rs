//! Tenant-scoped schedule CRUD and retention-policy get/put.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use xvault_core::models::{Claims, RetentionPolicy, Schedule};
use xvault_core::{clock, schedule};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub source_id: Uuid,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub interval_minutes: Option<i32>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_policy")]
    pub retention_policy: RetentionPolicy,
}

fn default_timezone() -> String {
    "UTC".to_owned()
}

fn default_policy() -> RetentionPolicy {
    RetentionPolicy::All
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleRequest {
    pub status: Option<String>,
    pub cron: Option<String>,
    pub interval_minutes: Option<i32>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_schedules).post(create_schedule))
        .route("/{id}", get(get_schedule).put(update_schedule).delete(delete_schedule))
        .route("/{id}/retention-policy", get(get_retention_policy).put(put_retention_policy))
}

async fn create_schedule(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<CreateScheduleRequest>,
) -> Result<(axum::http::StatusCode, Json<Schedule>), AppError> {
    let policy_json = serde_json::to_value(&body.retention_policy).map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let created = schedule::create_schedule(
        &state.pool,
        claims.tenant_id,
        body.source_id,
        body.cron,
        body.interval_minutes,
        &body.timezone,
        policy_json,
    )
    .await?;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn list_schedules(State(state): State<Arc<AppState>>, Extension(claims): Extension<Claims>) -> Result<Json<Vec<Schedule>>, AppError> {
    let schedules = sqlx::query_as::<_, Schedule>("SELECT * FROM schedules WHERE tenant_id = $1 ORDER BY created_at DESC")
        .bind(claims.tenant_id)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(schedules))
}

async fn get_schedule(State(state): State<Arc<AppState>>, Extension(claims): Extension<Claims>, Path(id): Path<Uuid>) -> Result<Json<Schedule>, AppError> {
    let row = fetch_schedule(&state, claims.tenant_id, id).await?;
    Ok(Json(row))
}

async fn update_schedule(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateScheduleRequest>,
) -> Result<Json<Schedule>, AppError> {
    let existing = fetch_schedule(&state, claims.tenant_id, id).await?;

    let cron = body.cron.or(existing.cron);
    let interval_minutes = body.interval_minutes.or(existing.interval_minutes);
    if cron.is_some() == interval_minutes.is_some() {
        return Err(AppError::InvalidInput("exactly one of cron or interval_minutes must be set".to_owned()));
    }

    let updated = sqlx::query_as::<_, Schedule>(
        r"UPDATE schedules SET status = COALESCE($3, status), cron = $4, interval_minutes = $5, updated_at = $6
          WHERE id = $1 AND tenant_id = $2
          RETURNING *",
    )
    .bind(id)
    .bind(claims.tenant_id)
    .bind(body.status)
    .bind(cron)
    .bind(interval_minutes)
    .bind(clock::now())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("schedule {id} not found")))?;

    Ok(Json(updated))
}

async fn delete_schedule(State(state): State<Arc<AppState>>, Extension(claims): Extension<Claims>, Path(id): Path<Uuid>) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM schedules WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(claims.tenant_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("schedule {id} not found")));
    }

    Ok(())
}

async fn get_retention_policy(State(state): State<Arc<AppState>>, Extension(claims): Extension<Claims>, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>, AppError> {
    let row = fetch_schedule(&state, claims.tenant_id, id).await?;
    Ok(Json(row.retention_policy))
}

async fn put_retention_policy(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(policy): Json<RetentionPolicy>,
) -> Result<Json<Schedule>, AppError> {
    let policy_json = serde_json::to_value(&policy).map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let updated = sqlx::query_as::<_, Schedule>(
        r"UPDATE schedules SET retention_policy = $3, updated_at = $4 WHERE id = $1 AND tenant_id = $2 RETURNING *",
    )
    .bind(id)
    .bind(claims.tenant_id)
    .bind(policy_json)
    .bind(clock::now())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("schedule {id} not found")))?;

    Ok(Json(updated))
}

async fn fetch_schedule(state: &AppState, tenant_id: Uuid, id: Uuid) -> Result<Schedule, AppError> {
    sqlx::query_as::<_, Schedule>("SELECT * FROM schedules WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("schedule {id} not found")))
}
