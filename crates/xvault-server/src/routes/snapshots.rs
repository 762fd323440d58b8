//! Tenant-scoped snapshot listing and restore-job creation.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;
use xvault_core::models::{Claims, Snapshot};
use xvault_core::snapshots;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RestoreJobResponse {
    pub job_id: Uuid,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_snapshots))
        .route("/{id}", get(get_snapshot))
        .route("/{id}/restore", post(restore_snapshot))
}

async fn list_snapshots(State(state): State<Arc<AppState>>, Extension(claims): Extension<Claims>) -> Result<Json<Vec<Snapshot>>, AppError> {
    let snapshots = sqlx::query_as::<_, Snapshot>("SELECT * FROM snapshots WHERE tenant_id = $1 ORDER BY created_at DESC")
        .bind(claims.tenant_id)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(snapshots))
}

async fn get_snapshot(State(state): State<Arc<AppState>>, Extension(claims): Extension<Claims>, Path(id): Path<Uuid>) -> Result<Json<Snapshot>, AppError> {
    let snapshot = snapshots::get_snapshot(&state.pool, id).await?;

    if snapshot.tenant_id != claims.tenant_id {
        return Err(AppError::NotFound(format!("snapshot {id} not found")));
    }

    Ok(Json(snapshot))
}

async fn restore_snapshot(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<(axum::http::StatusCode, Json<RestoreJobResponse>), AppError> {
    let snapshot = snapshots::get_snapshot(&state.pool, id).await?;

    if snapshot.tenant_id != claims.tenant_id {
        return Err(AppError::NotFound(format!("snapshot {id} not found")));
    }

    let job_id = snapshots::create_restore_job(&state.pool, id).await?;

    Ok((axum::http::StatusCode::ACCEPTED, Json(RestoreJobResponse { job_id })))
}
