//! Domain types shared across the control plane.
//!
//! Mirrors the data model in the specification: tenants, users, tenant
//! keypairs, credentials, sources, schedules, jobs, snapshots, workers,
//! refresh tokens, and logs. Enums are stored as `text` with a `CHECK`
//! constraint rather than native Postgres enums, so a new variant is a
//! migration that adds a constraint clause, not a type change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Users & tenants ──────────────────────────────────────────────────

/// A tenant — the account boundary. Owns users, keys, credentials,
/// sources, schedules, jobs, and snapshots.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user's role within their tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

impl Role {
    /// Whether this role satisfies `RequireAdmin` — both `admin` and
    /// `owner` are accepted, per the source's actual (if inconsistently
    /// documented) behavior.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Admin => write!(f, "admin"),
            Self::Member => write!(f, "member"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A registered user, globally unique by email.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status of a tenant's asymmetric keypair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Rotated,
    Disabled,
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Rotated => write!(f, "rotated"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// A tenant's asymmetric keypair. `public_key` is plaintext; the private
/// half is wrapped under the platform KEK.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TenantKey {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub public_key: String,
    #[serde(skip)]
    pub encrypted_private_key: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Ciphertext of a source secret, wrapped under the platform KEK.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Credential {
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[serde(skip)]
    pub ciphertext: String,
    pub created_at: DateTime<Utc>,
}

// ── Sources & schedules ──────────────────────────────────────────────

/// A backup source.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Source {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub source_type: String,
    pub name: String,
    pub status: String,
    pub config: serde_json::Value,
    pub credential_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A source-connector configuration, tagged by discriminant. Unknown
/// discriminators fail `InvalidInput` at the HTTP boundary rather than
/// being stored opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Ssh { host: String, port: u16, path: String, username: String },
    Sftp { host: String, port: u16, path: String, username: String },
    Ftp { host: String, port: u16, path: String, username: String },
    Database { engine: String, host: String, port: u16, database: String },
}

/// Declarative keep-set policy for a schedule's retention evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetentionPolicy {
    All,
    LatestN { keep_last_n: u32 },
    WithinDuration { keep_within_duration_secs: i64 },
}

/// A recurring backup schedule. Exactly one of `cron` / `interval_minutes`
/// is set.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Schedule {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub source_id: Uuid,
    pub cron: Option<String>,
    pub interval_minutes: Option<i32>,
    pub timezone: String,
    pub status: String,
    pub retention_policy: serde_json::Value,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Jobs ─────────────────────────────────────────────────────────────

/// The kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Backup,
    Restore,
    DeleteSnapshot,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backup => write!(f, "backup"),
            Self::Restore => write!(f, "restore"),
            Self::DeleteSnapshot => write!(f, "delete_snapshot"),
        }
    }
}

impl JobType {
    /// `delete_snapshot` and `restore` jobs are pinned to the worker that
    /// owns the snapshot; lease recovery must preserve their
    /// `target_worker_id`.
    #[must_use]
    pub const fn is_pinned(self) -> bool {
        matches!(self, Self::Restore | Self::DeleteSnapshot)
    }
}

/// A unit of work coordinated by the job queue.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub source_id: Option<Uuid>,
    pub job_type: String,
    pub status: String,
    pub priority: i32,
    pub target_worker_id: Option<Uuid>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub attempt: i32,
    pub payload: serde_json::Value,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ── Snapshots ────────────────────────────────────────────────────────

/// Where a storage backend persists snapshot bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    LocalFs,
    S3,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalFs => write!(f, "local_fs"),
            Self::S3 => write!(f, "s3"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local_fs" => Ok(Self::LocalFs),
            "s3" => Ok(Self::S3),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

/// Where a snapshot's bytes physically live, keyed by backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "storage_backend", rename_all = "snake_case")]
pub enum Locator {
    LocalFs { worker_id: Uuid, local_path: String },
    S3 { worker_id: Uuid, bucket: String, object_key: String, etag: String },
}

/// The encrypted, immutable result of a successful (or failed) backup job.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Snapshot {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub source_id: Uuid,
    pub job_id: Uuid,
    pub status: String,
    pub size_bytes: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub manifest: serde_json::Value,
    pub encryption_algorithm: String,
    pub encryption_recipient: String,
    pub storage_backend: String,
    pub worker_id: Uuid,
    pub local_path: Option<String>,
    pub bucket: Option<String>,
    pub object_key: Option<String>,
    pub etag: Option<String>,
    pub download_token: Option<String>,
    pub download_expires_at: Option<DateTime<Utc>>,
    pub download_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The result a worker reports on backup completion.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotResult {
    pub snapshot_id: Uuid,
    pub size_bytes: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub manifest: serde_json::Value,
    pub encryption_algorithm: String,
    pub encryption_recipient: String,
    pub locator: Locator,
}

// ── Workers ──────────────────────────────────────────────────────────

/// Operational status of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Online,
    Offline,
    Draining,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Draining => write!(f, "draining"),
        }
    }
}

/// Admin-facing derived health, never consulted by the core scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerHealth {
    Healthy,
    Warning,
    Critical,
    Offline,
}

/// A registered worker in the data-plane pool.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Worker {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub capabilities: serde_json::Value,
    pub storage_base_path: String,
    pub last_seen_at: DateTime<Utc>,
    pub system_metrics: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A registered restore service — shares lifecycle semantics with workers
/// but is not part of the backup worker pool.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RestoreService {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ── Auth ─────────────────────────────────────────────────────────────

/// A refresh token. Valid iff not expired and not revoked.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip)]
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl serde::Serialize for RefreshToken {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Never serialize the hash; this impl only exists so callers can log
        // the row's metadata without hand-picking fields everywhere.
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("RefreshToken", 6)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("user_id", &self.user_id)?;
        s.serialize_field("expires_at", &self.expires_at)?;
        s.serialize_field("revoked_at", &self.revoked_at)?;
        s.serialize_field("ip", &self.ip)?;
        s.serialize_field("user_agent", &self.user_agent)?;
        s.end()
    }
}

/// Claims carried by a signed access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub role: String,
    pub jti: String,
    pub exp: i64,
}

/// A newly minted access/refresh token pair.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

// ── System settings & logs ───────────────────────────────────────────

/// A single control-plane setting.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SystemSetting {
    pub key: String,
    pub value: String,
}

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A structured log entry ingested from a worker or emitted by the core.
/// Entity references are free-form text, not enforced foreign keys —
/// a log may outlive (or precede) the row it refers to.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub worker_id: Option<String>,
    pub job_id: Option<String>,
    pub snapshot_id: Option<String>,
    pub source_id: Option<String>,
    pub schedule_id: Option<String>,
}
