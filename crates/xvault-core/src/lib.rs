//! Core library for the `xvault` backup control plane.
//!
//! Contains the job queue, schedule and retention engines, the worker and
//! restore-service registry, auth core, cryptography provider, the log
//! sink, and the shared clock/db seams. This crate depends on no HTTP
//! framework — it exposes async functions over a `sqlx::PgPool` plus pure
//! functions (crypto, cron math) that `xvault-server` wires into routes
//! and background tasks.

pub mod auth;
pub mod clock;
pub mod crypto;
pub mod db;
pub mod error;
pub mod jobs;
pub mod logs;
pub mod models;
pub mod retention;
pub mod schedule;
pub mod snapshots;
pub mod workers;
