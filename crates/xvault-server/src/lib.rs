//! `xvault` HTTP control plane.
//!
//! Wires `xvault-core`'s job queue, schedule/retention engines, auth core,
//! and worker registry into a running Axum server: the public/tenant/admin
//! API surface, the unauthenticated internal surface workers and restore
//! services talk to, and the background scheduler/retention/lease-recovery
//! loops.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
