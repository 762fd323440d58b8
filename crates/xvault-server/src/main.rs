//! `xvault` control-plane entry point.
//!
//! Bootstraps the connection pool and auth core, then starts the Axum HTTP
//! server alongside three background loops (backup scheduler, retention
//! evaluator, lease recovery) and shuts all of it down gracefully on
//! SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use xvault_core::auth::AuthContext;
use xvault_core::crypto::EncryptionKey;
use xvault_core::models::Schedule;
use xvault_core::{db, jobs, retention};

use xvault_server::config::ServerConfig;
use xvault_server::routes;
use xvault_server::state::AppState;

const SCAN_MAX_RETRIES: u32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!("xvault-server starting");

    let state = build_app_state(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let backup_handle = {
        let state = Arc::clone(&state);
        let mut rx = shutdown_rx.clone();
        let interval_secs = config.backup_scheduler_interval_secs;
        tokio::spawn(async move {
            backup_scheduler_worker(state, &mut rx, interval_secs).await;
        })
    };

    let retention_handle = {
        let state = Arc::clone(&state);
        let mut rx = shutdown_rx.clone();
        let interval_secs = config.retention_evaluation_interval_hours.saturating_mul(3600);
        tokio::spawn(async move {
            retention_worker(state, &mut rx, interval_secs).await;
        })
    };

    let lease_handle = {
        let state = Arc::clone(&state);
        let mut rx = shutdown_rx.clone();
        let interval_secs = (config.lease_duration_secs / 2).max(1) as u64;
        tokio::spawn(async move {
            lease_recovery_worker(state, &mut rx, interval_secs).await;
        })
    };

    let app = routes::build_router(Arc::clone(&state)).layer(tower::timeout::TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)));

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.listen_addr))?;

    info!(addr = %config.listen_addr, "xvault-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("server error")?;

    info!("waiting for background workers to stop");
    let _ = tokio::time::timeout(Duration::from_secs(10), backup_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(10), retention_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(10), lease_handle).await;

    info!("xvault-server stopped");
    Ok(())
}

async fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let pool = db::connect(&config.database_url, 10).await.context("failed to connect to database")?;

    if config.auto_migrate {
        info!("running pending migrations");
        db::migrate(&pool).await.context("migration failed")?;
    }

    let kek_bytes = BASE64.decode(&config.encryption_kek).context("HUB_ENCRYPTION_KEK is not valid base64")?;
    let kek_array: [u8; 32] = kek_bytes.try_into().map_err(|_| anyhow::anyhow!("HUB_ENCRYPTION_KEK must decode to exactly 32 bytes"))?;
    let platform_kek = EncryptionKey::from_bytes(kek_array);

    let auth = AuthContext::new(
        config.jwt_secret.as_bytes().to_vec(),
        chrono::Duration::minutes(15),
        chrono::Duration::days(30),
        platform_kek,
    );

    Ok(Arc::new(AppState {
        pool,
        auth,
        config: Arc::new(config.clone()),
    }))
}

/// Scan all enabled schedules whose `next_run_at` has passed, enqueueing a
/// backup job and advancing `next_run_at` for each.
async fn backup_scheduler_worker(state: Arc<AppState>, shutdown: &mut watch::Receiver<bool>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    let mut consecutive_failures: u32 = 0;
    info!(interval_secs, "backup scheduler worker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match retry(|| run_due_schedules_tick(&state), shutdown).await {
                    Ok(None) => {
                        info!("backup scheduler worker shutting down");
                        return;
                    }
                    Ok(Some(enqueued)) => {
                        consecutive_failures = 0;
                        if enqueued > 0 {
                            info!(enqueued, "backup scheduler tick complete");
                        }
                    }
                    Err(last_err) => {
                        consecutive_failures = consecutive_failures.saturating_add(1);
                        log_tick_failure("backup scheduler", &last_err, consecutive_failures);
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("backup scheduler worker shutting down");
                return;
            }
        }
    }
}

async fn run_due_schedules_tick(state: &AppState) -> Result<usize, String> {
    let enqueued = xvault_core::schedule::run_due_schedules(&state.pool, xvault_core::clock::now())
        .await
        .map_err(|e| e.to_string())?;

    Ok(enqueued.len())
}

/// Evaluate retention policy per source against its completed snapshots.
async fn retention_worker(state: Arc<AppState>, shutdown: &mut watch::Receiver<bool>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    let mut consecutive_failures: u32 = 0;
    info!(interval_secs, "retention worker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match retry(|| run_retention_pass(&state), shutdown).await {
                    Ok(None) => {
                        info!("retention worker shutting down");
                        return;
                    }
                    Ok(Some(enqueued)) => {
                        consecutive_failures = 0;
                        if enqueued > 0 {
                            info!(enqueued, "retention tick complete");
                        }
                    }
                    Err(last_err) => {
                        consecutive_failures = consecutive_failures.saturating_add(1);
                        log_tick_failure("retention", &last_err, consecutive_failures);
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("retention worker shutting down");
                return;
            }
        }
    }
}

async fn run_retention_pass(state: &AppState) -> Result<usize, String> {
    let schedules = sqlx::query_as::<_, Schedule>("SELECT * FROM schedules WHERE status = 'enabled'")
        .fetch_all(&state.pool)
        .await
        .map_err(|e| e.to_string())?;

    let mut enqueued = 0usize;
    for sched in &schedules {
        let deleted = retention::run_for_source(&state.pool, sched.tenant_id, sched.source_id, &sched.retention_policy, xvault_core::clock::now())
            .await
            .map_err(|e| e.to_string())?;
        enqueued += deleted.len();
    }

    Ok(enqueued)
}

/// Recover leases abandoned by a crashed or partitioned worker, fused into
/// the same loop as the spec permits.
async fn lease_recovery_worker(state: Arc<AppState>, shutdown: &mut watch::Receiver<bool>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    let mut consecutive_failures: u32 = 0;
    info!(interval_secs, "lease recovery worker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match retry(|| run_lease_recovery(&state), shutdown).await {
                    Ok(None) => {
                        info!("lease recovery worker shutting down");
                        return;
                    }
                    Ok(Some(recovered)) => {
                        consecutive_failures = 0;
                        if recovered > 0 {
                            warn!(recovered, "lease recovery tick complete");
                        }
                    }
                    Err(last_err) => {
                        consecutive_failures = consecutive_failures.saturating_add(1);
                        log_tick_failure("lease recovery", &last_err, consecutive_failures);
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("lease recovery worker shutting down");
                return;
            }
        }
    }
}

async fn run_lease_recovery(state: &AppState) -> Result<usize, String> {
    let recovered = jobs::recover_abandoned_leases(&state.pool, xvault_core::clock::now()).await.map_err(|e| e.to_string())?;

    for job in &recovered {
        let _ = xvault_core::logs::lease_recovered(&state.pool, job.id).await;
    }

    Ok(recovered.len())
}

fn log_tick_failure(worker: &str, last_err: &str, consecutive_failures: u32) {
    if consecutive_failures >= 5 {
        tracing::error!(worker, error = %last_err, consecutive_failures, "tick persistently failing — storage may be down");
    } else {
        warn!(worker, error = %last_err, consecutive_failures, retries = SCAN_MAX_RETRIES, "tick failed after retries, will retry next interval");
    }
}

/// Run `f`, retrying on failure with exponential backoff (1s, 2s, 4s).
/// Returns `Ok(None)` if shutdown is requested mid-backoff.
async fn retry<F, Fut, T>(mut f: F, shutdown: &mut watch::Receiver<bool>) -> Result<Option<T>, String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, String>>,
{
    let mut last_err = String::new();

    for attempt in 0..=SCAN_MAX_RETRIES {
        match f().await {
            Ok(value) => return Ok(Some(value)),
            Err(e) => {
                last_err = e;

                if attempt == SCAN_MAX_RETRIES {
                    break;
                }

                let backoff = Duration::from_secs(1u64 << attempt);
                tracing::debug!(attempt = attempt.saturating_add(1), max = SCAN_MAX_RETRIES.saturating_add(1), backoff_ms = backoff.as_millis() as u64, error = %last_err, "tick failed, retrying");

                tokio::select! {
                    () = tokio::time::sleep(backoff) => {}
                    _ = shutdown.changed() => {
                        return Ok(None);
                    }
                }
            }
        }
    }

    Err(last_err)
}

/// Wait for SIGINT or SIGTERM, then broadcast shutdown.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    let _ = shutdown_tx.send(true);
}
