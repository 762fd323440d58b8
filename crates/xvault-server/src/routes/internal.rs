//! Unauthenticated (at the Rust layer) surface workers and restore
//! services talk to. Deployed behind a trusted network boundary; an
//! optional shared-secret bearer check is layered on by
//! [`crate::routes::internal_token_layer`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use xvault_core::models::{Job, LogEntry, LogLevel, RestoreService, SystemSetting, Worker, WorkerStatus};
use xvault_core::{crypto, jobs, logs, workers};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub worker_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CredentialResponse {
    pub id: Uuid,
    pub ciphertext: String,
    pub key_id: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    pub tenant_id: Uuid,
    pub public_key: String,
}

#[derive(Debug, Serialize)]
pub struct PrivateKeyResponse {
    pub tenant_id: Uuid,
    pub private_key_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterWorkerRequest {
    pub worker_id: Uuid,
    pub name: String,
    pub storage_base_path: String,
    #[serde(default = "default_capabilities")]
    pub capabilities: serde_json::Value,
}

fn default_capabilities() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatWorkerRequest {
    pub worker_id: Uuid,
    pub status: WorkerStatus,
    #[serde(default)]
    pub system_metrics: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterServiceRequest {
    pub service_id: Uuid,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatServiceRequest {
    pub service_id: Uuid,
    pub status: WorkerStatus,
}

#[derive(Debug, Serialize)]
pub struct DownloadExpirationResponse {
    pub hours: i64,
}

#[derive(Debug, Deserialize)]
pub struct IngestLogRequest {
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub schedule_id: Option<String>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs/claim", post(claim_job))
        .route("/jobs/{id}/complete", post(complete_job))
        .route("/credentials/{id}", get(get_credential))
        .route("/tenants/{id}/public-key", get(get_public_key))
        .route("/tenants/{id}/private-key", get(get_private_key))
        .route("/restore-jobs/claim", post(claim_restore_job))
        .route("/restore-jobs/{id}/complete", post(complete_job))
        .route("/services/register", post(register_service))
        .route("/services/heartbeat", post(heartbeat_service))
        .route("/workers/register", post(register_worker))
        .route("/workers/heartbeat", post(heartbeat_worker))
        .route("/settings/download-expiration", get(get_download_expiration))
        .route("/logs", post(ingest_log))
}

async fn claim_job(State(state): State<Arc<AppState>>, Json(body): Json<ClaimRequest>) -> Result<axum::response::Response, AppError> {
    claim_by_type(&state, body.worker_id, &["backup", "delete_snapshot"]).await
}

async fn claim_restore_job(State(state): State<Arc<AppState>>, Json(body): Json<ClaimRequest>) -> Result<axum::response::Response, AppError> {
    claim_by_type(&state, body.worker_id, &["restore"]).await
}

async fn claim_by_type(state: &AppState, worker_id: Uuid, job_types: &[&str]) -> Result<axum::response::Response, AppError> {
    use axum::response::IntoResponse;

    let lease = chrono::Duration::seconds(state.config.lease_duration_secs);
    match jobs::claim(&state.pool, worker_id, job_types, lease).await {
        Ok(job) => Ok((StatusCode::OK, Json(job)).into_response()),
        Err(xvault_core::error::JobError::NoWork) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(err) => Err(err.into()),
    }
}

async fn complete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<CompleteRequest>,
) -> Result<Json<Job>, AppError> {
    let job = jobs::complete(&state.pool, id, &body.status, body.error_message.as_deref()).await?;
    Ok(Json(job))
}

async fn get_credential(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<CredentialResponse>, AppError> {
    let row: (Uuid, String) = sqlx::query_as("SELECT id, ciphertext FROM credentials WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("credential {id} not found")))?;

    Ok(Json(CredentialResponse {
        id: row.0,
        ciphertext: row.1,
        key_id: "platform-kek-v1",
    }))
}

async fn get_public_key(State(state): State<Arc<AppState>>, Path(tenant_id): Path<Uuid>) -> Result<Json<PublicKeyResponse>, AppError> {
    let public_key: String = sqlx::query_scalar(
        "SELECT public_key FROM tenant_keys WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(tenant_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("tenant {tenant_id} has no key")))?;

    Ok(Json(PublicKeyResponse { tenant_id, public_key }))
}

async fn get_private_key(State(state): State<Arc<AppState>>, Path(tenant_id): Path<Uuid>) -> Result<Json<PrivateKeyResponse>, AppError> {
    let wrapped_base64: String = sqlx::query_scalar(
        "SELECT encrypted_private_key FROM tenant_keys WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(tenant_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("tenant {tenant_id} has no key")))?;

    let wrapped = BASE64.decode(&wrapped_base64).map_err(|e| AppError::Internal(e.to_string()))?;
    let private_bytes = crypto::decrypt(&state.auth.platform_kek, &wrapped)?;

    Ok(Json(PrivateKeyResponse {
        tenant_id,
        private_key_base64: BASE64.encode(private_bytes),
    }))
}

async fn register_worker(State(state): State<Arc<AppState>>, Json(body): Json<RegisterWorkerRequest>) -> Result<Json<Worker>, AppError> {
    let worker = workers::register(&state.pool, body.worker_id, &body.name, &body.storage_base_path, body.capabilities).await?;
    Ok(Json(worker))
}

async fn heartbeat_worker(State(state): State<Arc<AppState>>, Json(body): Json<HeartbeatWorkerRequest>) -> Result<Json<Worker>, AppError> {
    let worker = workers::heartbeat(&state.pool, body.worker_id, body.status, body.system_metrics).await?;
    Ok(Json(worker))
}

async fn register_service(State(state): State<Arc<AppState>>, Json(body): Json<RegisterServiceRequest>) -> Result<Json<RestoreService>, AppError> {
    let service = workers::register_restore_service(&state.pool, body.service_id, &body.name).await?;
    Ok(Json(service))
}

async fn heartbeat_service(State(state): State<Arc<AppState>>, Json(body): Json<HeartbeatServiceRequest>) -> Result<Json<RestoreService>, AppError> {
    let service = workers::heartbeat_restore_service(&state.pool, body.service_id, body.status).await?;
    Ok(Json(service))
}

async fn get_download_expiration(State(state): State<Arc<AppState>>) -> Result<Json<DownloadExpirationResponse>, AppError> {
    let setting = sqlx::query_as::<_, SystemSetting>("SELECT * FROM system_settings WHERE key = 'download_expiration_hours'")
        .fetch_optional(&state.pool)
        .await?;

    let hours = match setting {
        Some(s) => s.value.parse::<i64>().unwrap_or(24),
        None => 24,
    };

    Ok(Json(DownloadExpirationResponse { hours }))
}

async fn ingest_log(State(state): State<Arc<AppState>>, Json(body): Json<IngestLogRequest>) -> Result<(StatusCode, Json<LogEntry>), AppError> {
    let entry = logs::ingest(
        &state.pool,
        body.level,
        &body.message,
        body.worker_id.as_deref(),
        body.job_id.as_deref(),
        body.snapshot_id.as_deref(),
        body.source_id.as_deref(),
        body.schedule_id.as_deref(),
    )
    .await
    .map_err(AppError::from)?;

    Ok((StatusCode::CREATED, Json(entry)))
}
