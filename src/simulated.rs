//! In-memory connection backend
//!
//! Hands out numbered handles and records every close, with knobs for
//! connect latency and injected failures. Used by the CLI soak run, the
//! benchmarks and the tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::factory::ConnectionFactory;

/// Failures injected by [`SimulatedFactory`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulatedError {
    /// Connect was told to fail
    #[error("Simulated connect failure")]
    ConnectFailed,

    /// Close was told to fail
    #[error("Simulated close failure on connection {0}")]
    CloseFailed(u64),
}

/// Handle produced by [`SimulatedFactory`]
#[derive(Debug, PartialEq, Eq)]
pub struct SimulatedConnection {
    id: u64,
}

impl SimulatedConnection {
    /// Identifier assigned at connect, starting at 1
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Factory for [`SimulatedConnection`]s
#[derive(Debug, Default)]
pub struct SimulatedFactory {
    next_id: AtomicU64,
    /// Handles connected and not yet closed
    live: DashMap<u64, ()>,
    /// Close invocations per handle
    close_counts: DashMap<u64, usize>,
    connect_latency: Duration,
    fail_connects: AtomicUsize,
    fail_closes: AtomicBool,
}

impl SimulatedFactory {
    /// Create a factory that connects instantly and never fails
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every connect by `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Make the next `count` connects fail
    pub fn fail_next_connects(&self, count: usize) {
        self.fail_connects.store(count, Ordering::SeqCst);
    }

    /// Make every close report an error (the handle is still torn down)
    pub fn set_fail_closes(&self, fail: bool) {
        self.fail_closes.store(fail, Ordering::SeqCst);
    }

    /// Handles currently open
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Whether the handle with `id` is open
    #[must_use]
    pub fn is_live(&self, id: u64) -> bool {
        self.live.contains_key(&id)
    }

    /// Handles successfully connected so far
    #[must_use]
    pub fn connected_count(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// How many times close ran for the handle with `id`
    #[must_use]
    pub fn close_count(&self, id: u64) -> usize {
        self.close_counts.get(&id).map_or(0, |count| *count)
    }

    /// Close invocations across all handles
    #[must_use]
    pub fn total_closes(&self) -> usize {
        self.close_counts.iter().map(|entry| *entry.value()).sum()
    }

    fn take_connect_failure(&self) -> bool {
        self.fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ConnectionFactory for SimulatedFactory {
    type Connection = SimulatedConnection;
    type Error = SimulatedError;

    async fn connect(&self) -> Result<SimulatedConnection, SimulatedError> {
        if !self.connect_latency.is_zero() {
            tokio::time::sleep(self.connect_latency).await;
        }

        if self.take_connect_failure() {
            return Err(SimulatedError::ConnectFailed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.live.insert(id, ());
        debug!("Simulated connection {} opened", id);
        Ok(SimulatedConnection { id })
    }

    async fn close(&self, conn: SimulatedConnection) -> Result<(), SimulatedError> {
        *self.close_counts.entry(conn.id).or_insert(0) += 1;
        self.live.remove(&conn.id);
        debug!("Simulated connection {} closed", conn.id);

        if self.fail_closes.load(Ordering::SeqCst) {
            return Err(SimulatedError::CloseFailed(conn.id));
        }
        Ok(())
    }
}
