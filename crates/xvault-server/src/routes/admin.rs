//! Admin-only surface: retention triggers, system settings, user/tenant
//! CRUD, and tenant-wide listing of sources/schedules/snapshots/workers.
//!
//! Every handler here takes [`crate::middleware::AdminClaims`] instead of
//! the plain `Claims` extension — the role check happens once, at the
//! extractor, rather than being repeated per handler. There is no
//! platform-superadmin role ([`xvault_core::models::Role`] has only
//! `owner`/`admin`/`member`, all tenant-scoped), so user and tenant CRUD
//! here reach only the caller's own tenant — an admin manages their own
//! org, not the fleet.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use xvault_core::models::{Job, RestoreService, Role, Schedule, Snapshot, Source, SystemSetting, Tenant, User, Worker};
use xvault_core::{clock, crypto, retention};

use crate::error::AppError;
use crate::middleware::AdminClaims;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RetentionRunResponse {
    pub enqueued_job_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct PutSettingRequest {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub source_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    Role::Member.to_string()
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub role: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTenantRequest {
    pub name: String,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sources", get(list_all_sources))
        .route("/schedules", get(list_all_schedules))
        .route("/snapshots", get(list_all_snapshots))
        .route("/jobs", get(list_all_jobs))
        .route("/sources/{id}/retention/run", post(run_retention))
        .route("/workers", get(list_workers))
        .route("/restore-services", get(list_restore_services))
        .route("/settings", get(list_settings))
        .route("/settings/{key}", put(put_setting))
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/tenant", get(get_tenant).put(update_tenant))
}

async fn list_all_sources(State(state): State<Arc<AppState>>, AdminClaims(claims): AdminClaims) -> Result<Json<Vec<Source>>, AppError> {
    let sources = sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE tenant_id = $1 ORDER BY created_at DESC")
        .bind(claims.tenant_id)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(sources))
}

async fn list_all_schedules(State(state): State<Arc<AppState>>, AdminClaims(claims): AdminClaims) -> Result<Json<Vec<Schedule>>, AppError> {
    let schedules = sqlx::query_as::<_, Schedule>("SELECT * FROM schedules WHERE tenant_id = $1 ORDER BY created_at DESC")
        .bind(claims.tenant_id)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(schedules))
}

async fn list_all_snapshots(State(state): State<Arc<AppState>>, AdminClaims(claims): AdminClaims) -> Result<Json<Vec<Snapshot>>, AppError> {
    let snapshots = sqlx::query_as::<_, Snapshot>("SELECT * FROM snapshots WHERE tenant_id = $1 ORDER BY created_at DESC")
        .bind(claims.tenant_id)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(snapshots))
}

async fn list_all_jobs(
    State(state): State<Arc<AppState>>,
    AdminClaims(claims): AdminClaims,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<Job>>, AppError> {
    let jobs = match query.source_id {
        Some(source_id) => {
            sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE tenant_id = $1 AND source_id = $2 ORDER BY created_at DESC")
                .bind(claims.tenant_id)
                .bind(source_id)
                .fetch_all(&state.pool)
                .await?
        }
        None => {
            sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE tenant_id = $1 ORDER BY created_at DESC")
                .bind(claims.tenant_id)
                .fetch_all(&state.pool)
                .await?
        }
    };

    Ok(Json(jobs))
}

async fn run_retention(
    State(state): State<Arc<AppState>>,
    AdminClaims(claims): AdminClaims,
    Path(source_id): Path<Uuid>,
) -> Result<Json<RetentionRunResponse>, AppError> {
    let source = sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE id = $1 AND tenant_id = $2")
        .bind(source_id)
        .bind(claims.tenant_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("source {source_id} not found")))?;

    let schedule = sqlx::query_as::<_, Schedule>("SELECT * FROM schedules WHERE source_id = $1 ORDER BY created_at DESC LIMIT 1")
        .bind(source_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("source {source_id} has no schedule to derive a retention policy from")))?;

    let enqueued_job_ids = retention::run_for_source(&state.pool, claims.tenant_id, source.id, &schedule.retention_policy, clock::now()).await?;

    Ok(Json(RetentionRunResponse { enqueued_job_ids }))
}

async fn list_workers(State(state): State<Arc<AppState>>, AdminClaims(_claims): AdminClaims) -> Result<Json<Vec<Worker>>, AppError> {
    let workers = sqlx::query_as::<_, Worker>("SELECT * FROM workers ORDER BY created_at DESC")
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(workers))
}

async fn list_restore_services(State(state): State<Arc<AppState>>, AdminClaims(_claims): AdminClaims) -> Result<Json<Vec<RestoreService>>, AppError> {
    let services = sqlx::query_as::<_, RestoreService>("SELECT * FROM restore_services ORDER BY created_at DESC")
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(services))
}

async fn list_settings(State(state): State<Arc<AppState>>, AdminClaims(_claims): AdminClaims) -> Result<Json<Vec<SystemSetting>>, AppError> {
    let settings = sqlx::query_as::<_, SystemSetting>("SELECT * FROM system_settings ORDER BY key")
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(settings))
}

async fn put_setting(
    State(state): State<Arc<AppState>>,
    AdminClaims(_claims): AdminClaims,
    Path(key): Path<String>,
    Json(body): Json<PutSettingRequest>,
) -> Result<Json<SystemSetting>, AppError> {
    let setting = sqlx::query_as::<_, SystemSetting>(
        r"INSERT INTO system_settings (key, value) VALUES ($1, $2)
          ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
          RETURNING *",
    )
    .bind(key)
    .bind(body.value)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(setting))
}

async fn list_users(State(state): State<Arc<AppState>>, AdminClaims(claims): AdminClaims) -> Result<Json<Vec<User>>, AppError> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users WHERE tenant_id = $1 ORDER BY created_at ASC")
        .bind(claims.tenant_id)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(users))
}

async fn get_user(State(state): State<Arc<AppState>>, AdminClaims(claims): AdminClaims, Path(id): Path<Uuid>) -> Result<Json<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(claims.tenant_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;

    Ok(Json(user))
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    AdminClaims(claims): AdminClaims,
    Json(body): Json<CreateUserRequest>,
) -> Result<(axum::http::StatusCode, Json<User>), AppError> {
    let role: Role = body.role.parse().map_err(AppError::InvalidInput)?;
    let password_hash = crypto::hash_password(&body.password)?;

    let user = sqlx::query_as::<_, User>(
        r"INSERT INTO users (id, tenant_id, email, password_hash, role)
          VALUES ($1, $2, $3, $4, $5)
          RETURNING *",
    )
    .bind(clock::new_id())
    .bind(claims.tenant_id)
    .bind(&body.email)
    .bind(&password_hash)
    .bind(role.to_string())
    .fetch_one(&state.pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::Conflict(format!("email {} already registered", body.email)),
        _ => AppError::from(e),
    })?;

    Ok((axum::http::StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    AdminClaims(claims): AdminClaims,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let role = body.role.map(|r| r.parse::<Role>().map(|r| r.to_string())).transpose().map_err(AppError::InvalidInput)?;
    let password_hash = body.password.as_deref().map(crypto::hash_password).transpose()?;

    let user = sqlx::query_as::<_, User>(
        r"UPDATE users SET
              role = COALESCE($3, role),
              password_hash = COALESCE($4, password_hash),
              updated_at = $5
          WHERE id = $1 AND tenant_id = $2
          RETURNING *",
    )
    .bind(id)
    .bind(claims.tenant_id)
    .bind(role)
    .bind(password_hash)
    .bind(clock::now())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;

    Ok(Json(user))
}

async fn delete_user(State(state): State<Arc<AppState>>, AdminClaims(claims): AdminClaims, Path(id): Path<Uuid>) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(claims.tenant_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("user {id} not found")));
    }

    Ok(())
}

async fn get_tenant(State(state): State<Arc<AppState>>, AdminClaims(claims): AdminClaims) -> Result<Json<Tenant>, AppError> {
    let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
        .bind(claims.tenant_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("tenant {} not found", claims.tenant_id)))?;

    Ok(Json(tenant))
}

async fn update_tenant(
    State(state): State<Arc<AppState>>,
    AdminClaims(claims): AdminClaims,
    Json(body): Json<UpdateTenantRequest>,
) -> Result<Json<Tenant>, AppError> {
    let tenant = sqlx::query_as::<_, Tenant>(
        r"UPDATE tenants SET name = $2, updated_at = $3 WHERE id = $1 RETURNING *",
    )
    .bind(claims.tenant_id)
    .bind(body.name)
    .bind(clock::now())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("tenant {} not found", claims.tenant_id)))?;

    Ok(Json(tenant))
}
