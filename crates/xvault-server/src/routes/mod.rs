//! Route assembly: public, tenant, admin, and internal surfaces, mirroring
//! the teacher's `cloud_router`/`authenticated_routes` nesting pattern.

pub mod admin;
pub mod auth;
pub mod internal;
pub mod schedules;
pub mod snapshots;
pub mod sources;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;

use crate::error::AppError;
use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Build the complete application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let public = Router::new().nest("/api/v1/auth", auth::public_router());

    let tenant = Router::new()
        .nest("/api/v1/auth", auth::tenant_router())
        .nest("/api/v1/sources", sources::router())
        .nest("/api/v1/schedules", schedules::router())
        .nest("/api/v1/snapshots", snapshots::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin = Router::new()
        .nest("/api/v1/admin", admin::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let internal = Router::new()
        .nest("/internal", internal::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), internal_token_middleware));

    Router::new().merge(public).merge(tenant).merge(admin).merge(internal).with_state(state)
}

/// Optional shared-secret bearer check guarding `/internal/*`, layered on
/// in addition to "deploy behind a trusted boundary" — a no-op when
/// `HUB_INTERNAL_TOKEN` isn't configured.
async fn internal_token_middleware(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Result<Response, AppError> {
    let Some(expected) = state.config.internal_token.as_deref() else {
        return Ok(next.run(req).await);
    };

    let provided = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided != Some(expected) {
        return Err(AppError::Unauthorized("invalid or missing internal token".to_owned()));
    }

    Ok(next.run(req).await)
}
