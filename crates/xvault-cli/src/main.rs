//! xvault CLI — operator client for the xvault backup control plane.
//!
//! Two kinds of commands live here: `migrate`/`migrate-status` talk to
//! `DATABASE_URL` directly through the embedded migrator in `xvault-core`,
//! and everything else is a thin HTTP client against the server's admin
//! and internal routes.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";

/// xvault — operator CLI for the backup control plane.
#[derive(Parser)]
#[command(
    name = "xvault",
    version,
    about = "xvault CLI — migrations and operator conveniences for the backup control plane",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         DATABASE_URL   Postgres connection string (migrate, migrate-status)\n  \
         XVAULT_ADDR    Server address (default: http://127.0.0.1:8080)\n  \
         XVAULT_TOKEN   Admin access token\n\n\
         {DIM}Examples:{RESET}\n  \
         xvault migrate\n  \
         xvault worker list\n  \
         xvault retention run --source <source-id>"
    ),
)]
struct Cli {
    /// Server address, for commands that talk to the HTTP API.
    #[arg(long, env = "XVAULT_ADDR", default_value = "http://127.0.0.1:8080")]
    addr: String,

    /// Admin access token, for commands that talk to the HTTP API.
    #[arg(long, env = "XVAULT_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply any pending database migrations.
    Migrate {
        /// Postgres connection string. Falls back to DATABASE_URL.
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Report which migrations are applied vs. pending, without applying any.
    MigrateStatus {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Inspect registered workers and restore services.
    Worker {
        #[command(subcommand)]
        action: WorkerCommands,
    },
    /// Inspect the job queue.
    Job {
        #[command(subcommand)]
        action: JobCommands,
    },
    /// Trigger retention enforcement for a source.
    Retention {
        #[command(subcommand)]
        action: RetentionCommands,
    },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// List registered backup workers.
    List,
    /// List registered restore services.
    Services,
}

#[derive(Subcommand)]
enum JobCommands {
    /// List jobs for the caller's tenant.
    List {
        /// Filter by source id.
        #[arg(long)]
        source: Option<String>,
    },
}

#[derive(Subcommand)]
enum RetentionCommands {
    /// Run the retention policy for one source, enqueuing delete jobs.
    Run {
        #[arg(long)]
        source: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli).await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{RED}{BOLD}error:{RESET} {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Migrate { database_url } => cmd_migrate(&database_url).await,
        Commands::MigrateStatus { database_url } => cmd_migrate_status(&database_url).await,
        Commands::Worker { action } => {
            let client = Client::new(cli.addr, cli.token);
            match action {
                WorkerCommands::List => cmd_worker_list(&client).await,
                WorkerCommands::Services => cmd_worker_services(&client).await,
            }
        }
        Commands::Job { action } => {
            let client = Client::new(cli.addr, cli.token);
            match action {
                JobCommands::List { source } => cmd_job_list(&client, source.as_deref()).await,
            }
        }
        Commands::Retention { action } => {
            let client = Client::new(cli.addr, cli.token);
            match action {
                RetentionCommands::Run { source } => cmd_retention_run(&client, &source).await,
            }
        }
    }
}

// ── migrations ───────────────────────────────────────────────────────

async fn cmd_migrate(database_url: &str) -> Result<()> {
    let pool = xvault_core::db::connect(database_url, 5)
        .await
        .context("failed to connect to database")?;
    xvault_core::db::migrate(&pool)
        .await
        .context("migration failed")?;
    println!("{GREEN}migrations applied{RESET}");
    Ok(())
}

async fn cmd_migrate_status(database_url: &str) -> Result<()> {
    let pool = xvault_core::db::connect(database_url, 5)
        .await
        .context("failed to connect to database")?;

    let applied: Vec<i64> = sqlx::query_scalar("SELECT version FROM _sqlx_migrations ORDER BY version")
        .fetch_all(&pool)
        .await
        .unwrap_or_default();

    let mut pending = 0usize;
    for migration in xvault_core::db::MIGRATOR.iter() {
        let version = migration.version;
        let status = if applied.contains(&version) {
            "applied"
        } else {
            pending += 1;
            "pending"
        };
        println!("  {version:<16} {status:<8} {}", migration.description);
    }

    if pending > 0 {
        println!();
        println!("{pending} migration(s) pending — run `xvault migrate`");
        bail!("pending migrations");
    }

    println!();
    println!("{GREEN}up to date{RESET}");
    Ok(())
}

// ── worker/job/retention HTTP commands ──────────────────────────────

async fn cmd_worker_list(client: &Client) -> Result<()> {
    let resp = client.get("/api/v1/admin/workers").await?;
    print_json_rows(&resp, &["id", "status", "hostname", "last_heartbeat_at"]);
    Ok(())
}

async fn cmd_worker_services(client: &Client) -> Result<()> {
    let resp = client.get("/api/v1/admin/restore-services").await?;
    print_json_rows(&resp, &["id", "status", "hostname", "last_heartbeat_at"]);
    Ok(())
}

async fn cmd_job_list(client: &Client, source: Option<&str>) -> Result<()> {
    let path = match source {
        Some(id) => format!("/api/v1/admin/jobs?source_id={id}"),
        None => "/api/v1/admin/jobs".to_string(),
    };
    let resp = client.get(&path).await?;
    print_json_rows(&resp, &["id", "job_type", "status", "attempt", "created_at"]);
    Ok(())
}

async fn cmd_retention_run(client: &Client, source: &str) -> Result<()> {
    let path = format!("/api/v1/admin/sources/{source}/retention/run");
    let resp = client.post_no_body(&path).await?;
    println!("{GREEN}retention run enqueued{RESET}");
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}

fn print_json_rows(value: &Value, columns: &[&str]) {
    let Some(rows) = value.as_array() else {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
        return;
    };
    if rows.is_empty() {
        println!("{DIM}(none){RESET}");
        return;
    }
    for row in rows {
        let fields: Vec<String> = columns
            .iter()
            .map(|col| {
                row.get(col)
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                    .unwrap_or_else(|| "-".to_string())
            })
            .collect();
        println!("{}", fields.join("  "));
    }
}

// ── HTTP client ──────────────────────────────────────────────────────

struct Client {
    http: reqwest::Client,
    addr: String,
    token: Option<String>,
}

impl Client {
    fn new(addr: String, token: Option<String>) -> Self {
        let http = reqwest::Client::new();
        Self { http, addr, token }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.addr)
    }

    fn auth_header(&self) -> Result<String> {
        self.token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no token provided — set XVAULT_TOKEN or use --token"))
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let token = self.auth_header()?;
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&token)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn post_no_body(&self, path: &str) -> Result<Value> {
        let token = self.auth_header()?;
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&token)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    let body = resp.text().await.context("failed to read response body")?;
    if !status.is_success() {
        bail!("server returned {status}: {body}");
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).context("failed to parse response JSON")
}
