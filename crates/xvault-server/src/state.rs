//! Shared application state for `xvault-server`.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers and background tasks via `Arc`. It holds the connection
//! pool, the auth core, and the configuration needed by request handlers —
//! no in-process caches, per the "shared resource policy".

use std::sync::Arc;

use sqlx::PgPool;
use xvault_core::auth::AuthContext;

use crate::config::ServerConfig;

/// Shared application state passed to all HTTP handlers and background
/// tasks.
pub struct AppState {
    /// The single connection pool, shared by every query.
    pub pool: PgPool,
    /// Signing/hashing context for the auth core.
    pub auth: AuthContext,
    /// Resolved configuration.
    pub config: Arc<ServerConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
