//! Database connection setup (C2).
//!
//! A thin wrapper around `sqlx::PgPool` construction and the embedded
//! migration runner. Every other module takes a `&PgPool` directly rather
//! than a wrapper type — queries are plain `sqlx::query_as` calls against
//! parameterized SQL, matching how the rest of this crate talks to
//! Postgres.

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Migrations embedded at compile time from `xvault-server/migrations`.
///
/// The core crate owns the migration runner so both the server and the CLI
/// (`xvault-cli migrate`) share one source of truth for schema.
pub static MIGRATOR: Migrator = sqlx::migrate!("../xvault-server/migrations");

/// Build a connection pool against `database_url`.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the pool cannot establish its initial
/// connections.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Apply any pending migrations.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if a migration fails to apply.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}
