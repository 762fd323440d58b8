//! Tenant-scoped source CRUD.
//!
//! Sources and their credentials are plain CRUD, peripheral to the
//! orchestration engine — `config` is parsed into [`SourceConfig`]'s tagged
//! variants at this boundary so an unknown discriminator fails
//! `InvalidInput` rather than being stored opaquely. Credential values are
//! wrapped under the platform KEK the same way a tenant's private key is
//! wrapped in `xvault_core::auth::register`.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use uuid::Uuid;
use xvault_core::models::{Claims, Source, SourceConfig};
use xvault_core::{clock, crypto};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSourceRequest {
    pub name: String,
    pub config: SourceConfig,
    /// Plaintext credential (password or private key) to wrap and store,
    /// if this source type requires one.
    #[serde(default)]
    pub credential: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSourceRequest {
    pub name: Option<String>,
    pub status: Option<String>,
    pub config: Option<SourceConfig>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_sources).post(create_source))
        .route("/{id}", get(get_source).put(update_source).delete(delete_source))
}

async fn create_source(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<CreateSourceRequest>,
) -> Result<(axum::http::StatusCode, Json<Source>), AppError> {
    let config_json = serde_json::to_value(&body.config).map_err(|e| AppError::InvalidInput(e.to_string()))?;
    let source_type = source_type_tag(&body.config);

    let mut tx = state.pool.begin().await?;

    let credential_id = if let Some(plaintext) = body.credential.as_deref() {
        let ciphertext = crypto::encrypt(&state.auth.platform_kek, plaintext.as_bytes()).map_err(AppError::from)?;
        let id: Uuid = sqlx::query_scalar(
            r"INSERT INTO credentials (id, tenant_id, ciphertext) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(clock::new_id())
        .bind(claims.tenant_id)
        .bind(BASE64.encode(ciphertext))
        .fetch_one(&mut *tx)
        .await?;
        Some(id)
    } else {
        None
    };

    let source = sqlx::query_as::<_, Source>(
        r"INSERT INTO sources (id, tenant_id, source_type, name, status, config, credential_id)
          VALUES ($1, $2, $3, $4, 'active', $5, $6)
          RETURNING *",
    )
    .bind(clock::new_id())
    .bind(claims.tenant_id)
    .bind(source_type)
    .bind(&body.name)
    .bind(config_json)
    .bind(credential_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok((axum::http::StatusCode::CREATED, Json(source)))
}

async fn list_sources(State(state): State<Arc<AppState>>, Extension(claims): Extension<Claims>) -> Result<Json<Vec<Source>>, AppError> {
    let sources = sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE tenant_id = $1 ORDER BY created_at DESC")
        .bind(claims.tenant_id)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(sources))
}

async fn get_source(State(state): State<Arc<AppState>>, Extension(claims): Extension<Claims>, Path(id): Path<Uuid>) -> Result<Json<Source>, AppError> {
    let source = sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(claims.tenant_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("source {id} not found")))?;

    Ok(Json(source))
}

async fn update_source(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateSourceRequest>,
) -> Result<Json<Source>, AppError> {
    let config_json = body.config.as_ref().map(serde_json::to_value).transpose().map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let source = sqlx::query_as::<_, Source>(
        r"UPDATE sources SET
              name = COALESCE($3, name),
              status = COALESCE($4, status),
              config = COALESCE($5, config),
              updated_at = $6
          WHERE id = $1 AND tenant_id = $2
          RETURNING *",
    )
    .bind(id)
    .bind(claims.tenant_id)
    .bind(body.name)
    .bind(body.status)
    .bind(config_json)
    .bind(clock::now())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("source {id} not found")))?;

    Ok(Json(source))
}

/// Deleting a source whose credential is referenced elsewhere is left to
/// the database's `ON DELETE RESTRICT` on `sources.credential_id`; a
/// referenced credential cannot itself be deleted directly (no route
/// exposes standalone credential deletion).
async fn delete_source(State(state): State<Arc<AppState>>, Extension(claims): Extension<Claims>, Path(id): Path<Uuid>) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM sources WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(claims.tenant_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("source {id} not found")));
    }

    Ok(())
}

fn source_type_tag(config: &SourceConfig) -> &'static str {
    match config {
        SourceConfig::Ssh { .. } => "ssh",
        SourceConfig::Sftp { .. } => "sftp",
        SourceConfig::Ftp { .. } => "ftp",
        SourceConfig::Database { .. } => "database",
    }
}
