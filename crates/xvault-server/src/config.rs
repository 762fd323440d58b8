//! Server configuration for `xvault-server`.
//!
//! Loads configuration from environment variables with sensible defaults,
//! per the configuration table in the specification.

use std::env;

/// Control-plane configuration, built once in `main` via
/// [`ServerConfig::from_env`] and shared read-only through
/// [`crate::state::AppState`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to (`HUB_LISTEN_ADDR`, default `:8080`).
    pub listen_addr: String,
    /// Postgres connection string (`DATABASE_URL`, required).
    pub database_url: String,
    /// Queue/cache channel URL (`REDIS_URL`, required). Validated present
    /// at startup but not otherwise used — the job queue lives entirely in
    /// Postgres via `FOR UPDATE SKIP LOCKED`.
    pub redis_url: String,
    /// 32-byte base64 platform KEK (`HUB_ENCRYPTION_KEK`, required).
    pub encryption_kek: String,
    /// HMAC key for access tokens (`HUB_JWT_SECRET`, required).
    pub jwt_secret: String,
    /// Run migrations on boot (`HUB_AUTO_MIGRATE`, default `false`).
    pub auto_migrate: bool,
    /// Backup-scheduler tick interval (`BACKUP_SCHEDULER_INTERVAL_SECONDS`, default 60).
    pub backup_scheduler_interval_secs: u64,
    /// Retention-evaluator tick interval (`RETENTION_EVALUATION_INTERVAL_HOURS`, default 6).
    pub retention_evaluation_interval_hours: u64,
    /// `tracing` log level filter (`HUB_LOG_LEVEL`, default `info`).
    pub log_level: String,
    /// Per-request deadline (`HUB_REQUEST_TIMEOUT_SECS`, default 5).
    pub request_timeout_secs: u64,
    /// Optional shared bearer secret guarding `/internal/*` routes
    /// (`HUB_INTERNAL_TOKEN`).
    pub internal_token: Option<String>,
    /// Lease duration handed out by `jobs::claim` and used to derive the
    /// lease-recovery tick cadence (not independently configurable by the
    /// spec; fixed at 5 minutes per the S1/S2 scenarios).
    pub lease_duration_secs: i64,
}

fn env_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_required(key: &str) -> Result<String, anyhow::Error> {
    env::var(key).map_err(|_| anyhow::anyhow!("missing required environment variable {key}"))
}

fn env_default_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable (`DATABASE_URL`, `REDIS_URL`,
    /// `HUB_ENCRYPTION_KEK`, `HUB_JWT_SECRET`) is missing.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Ok(Self {
            listen_addr: env_default("HUB_LISTEN_ADDR", ":8080"),
            database_url: env_required("DATABASE_URL")?,
            redis_url: env_required("REDIS_URL")?,
            encryption_kek: env_required("HUB_ENCRYPTION_KEK")?,
            jwt_secret: env_required("HUB_JWT_SECRET")?,
            auto_migrate: env_default_parsed("HUB_AUTO_MIGRATE", false),
            backup_scheduler_interval_secs: env_default_parsed("BACKUP_SCHEDULER_INTERVAL_SECONDS", 60),
            retention_evaluation_interval_hours: env_default_parsed("RETENTION_EVALUATION_INTERVAL_HOURS", 6),
            log_level: env_default("HUB_LOG_LEVEL", "info"),
            request_timeout_secs: env_default_parsed("HUB_REQUEST_TIMEOUT_SECS", 5),
            internal_token: env::var("HUB_INTERNAL_TOKEN").ok(),
            lease_duration_secs: 300,
        })
    }
}
