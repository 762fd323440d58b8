//! Authentication middleware and extractors for `xvault-server`.
//!
//! Mirrors the teacher's `cloud_auth_middleware`/`CloudIdentity` shape:
//! the `Authorization: Bearer <token>` header is parsed, the access token
//! verified and checked against the live blacklist, and the resulting
//! [`Claims`] injected into request extensions for downstream handlers.
//! `AdminClaims` is a separate Axum extractor built from the same
//! extension via `Claims`'s fallible `TryFrom`.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use xvault_core::auth::AdminClaims as CoreAdminClaims;
use xvault_core::models::Claims;

use crate::error::AppError;
use crate::state::AppState;

/// Axum middleware that authenticates every request passing through it:
/// verifies the bearer access token's signature and expiry, rejects
/// blacklisted tokens, and injects [`Claims`] into request extensions.
///
/// # Errors
///
/// Returns [`AppError::Unauthorized`] if the header is missing, malformed,
/// or the token is invalid, expired, or blacklisted.
pub async fn auth_middleware(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let Some(header) = header else {
        return Err(AppError::Unauthorized("missing Authorization header".to_owned()));
    };

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Authorization header must use Bearer scheme".to_owned()))?;

    let claims = xvault_core::auth::parse_access_token(&state.auth, token)?;

    if xvault_core::auth::is_blacklisted(&state.pool, &claims.jti).await? {
        return Err(AppError::Unauthorized("token has been revoked".to_owned()));
    }

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Extractor requiring the caller's role to satisfy `RequireAdmin`
/// (`owner` or `admin`). Must run after [`auth_middleware`] has inserted
/// [`Claims`] into the request extensions.
pub struct AdminClaims(pub Claims);

impl<S> FromRequestParts<S> for AdminClaims
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("missing authentication context".to_owned()))?;

        let admin = CoreAdminClaims::try_from(claims)?;
        Ok(Self(admin.0))
    }
}
