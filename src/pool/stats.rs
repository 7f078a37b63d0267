//! Pool status snapshots and lifetime counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Configured ceiling
    pub max_open: usize,
    /// Configured floor
    pub min_open: usize,
    /// Idle + checked out
    pub num_open: usize,
    /// Connects in progress, counted toward `max_open` but not `num_open`
    pub pending: usize,
    /// Connections sitting in the idle buffer
    pub idle: usize,
    /// Connections held by callers
    pub in_use: usize,
    /// Whether shutdown has run
    pub closed: bool,
}

/// Counters accumulated over the life of a pool
#[derive(Debug, Default)]
pub struct PoolMetrics {
    created: AtomicU64,
    destroyed: AtomicU64,
    recycled: AtomicU64,
    warmup_failures: AtomicU64,
    timeouts: AtomicU64,
}

impl PoolMetrics {
    pub(super) fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_destroyed(&self) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_recycled(&self) {
        self.recycled.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_warmup_failure(&self) {
        self.warmup_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Connections successfully opened by the factory
    #[must_use]
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Connections handed to the factory's close
    #[must_use]
    pub fn destroyed(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }

    /// Releases that put a connection back into the idle buffer
    #[must_use]
    pub fn recycled(&self) -> u64 {
        self.recycled.load(Ordering::Relaxed)
    }

    /// Factory failures swallowed during warm-up
    #[must_use]
    pub fn warmup_failures(&self) -> u64 {
        self.warmup_failures.load(Ordering::Relaxed)
    }

    /// Bounded acquires that expired
    #[must_use]
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }
}
