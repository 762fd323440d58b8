//! Clock and ID generation (C1).
//!
//! A thin seam over `chrono`/`uuid` so the rest of the core never calls
//! `Utc::now()` or `Uuid::new_v4()` directly — tests can swap in a fixed
//! clock without threading a trait through every function signature that
//! doesn't otherwise need one.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Current time, UTC. The single call site every other module goes
/// through, so a future fixed-clock test harness has one function to
/// intercept.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// A fresh opaque identifier.
#[must_use]
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

/// `n` cryptographically random bytes, from the OS CSPRNG.
#[must_use]
pub fn random_bytes(n: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut buf = vec![0u8; n];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}
