//! Public and tenant-scoped auth routes: register, login, refresh, logout,
//! and the current-session `me` endpoint.

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use xvault_core::auth;
use xvault_core::models::{Claims, Session, Tenant, User};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub tenant_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: uuid::Uuid,
    pub email: String,
    pub role: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserSummary,
    pub tenant: Option<Tenant>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

fn session_body(user: &User, tenant: Option<Tenant>, session: Session) -> SessionResponse {
    SessionResponse {
        user: UserSummary::from(user),
        tenant,
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        expires_at: session.expires_at,
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: uuid::Uuid,
    pub tenant_id: uuid::Uuid,
    pub email: String,
    pub role: String,
}

pub fn public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
}

pub fn tenant_router() -> Router<Arc<AppState>> {
    Router::new().route("/logout", post(logout)).route("/me", get(me))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(axum::http::StatusCode, Json<SessionResponse>), AppError> {
    let (user, tenant, session) = auth::register(&state.pool, &state.auth, &body.tenant_name, &body.email, &body.password, None, None).await?;

    Ok((axum::http::StatusCode::CREATED, Json(session_body(&user, Some(tenant), session))))
}

async fn login(State(state): State<Arc<AppState>>, Json(body): Json<LoginRequest>) -> Result<Json<SessionResponse>, AppError> {
    let (user, session) = auth::login(&state.pool, &state.auth, &body.email, &body.password, None, None).await?;

    Ok(Json(session_body(&user, None, session)))
}

async fn refresh(State(state): State<Arc<AppState>>, Json(body): Json<RefreshRequest>) -> Result<Json<Session>, AppError> {
    let session = auth::refresh(&state.pool, &state.auth, &body.refresh_token, None, None).await?;

    Ok(Json(session))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    headers: axum::http::HeaderMap,
    body: Option<Json<LogoutRequest>>,
) -> Result<(), AppError> {
    let access_token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing Authorization header".to_owned()))?;

    let refresh_token = body.and_then(|Json(b)| b.refresh_token);
    auth::logout(&state.pool, &state.auth, access_token, refresh_token.as_deref()).await?;

    tracing::info!(user_id = %claims.user_id, "user logged out");
    Ok(())
}

async fn me(Extension(claims): Extension<Claims>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: claims.user_id,
        tenant_id: claims.tenant_id,
        email: claims.email,
        role: claims.role,
    })
}
