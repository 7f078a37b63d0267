//! Bounded pool of reusable connection handles
//!
//! Idle connections are owned by the pool, checked-out connections by the
//! caller. A single semaphore tracks how many more connections may be handed
//! out (idle ones plus unused capacity), and every acquirer waits on it in
//! FIFO order.

mod connection_pool;
mod state;
mod stats;

pub use connection_pool::ConnectionPool;
pub use stats::{PoolMetrics, PoolStatus};

/// Largest `max_open` a pool accepts
pub const MAX_OPEN_LIMIT: usize = tokio::sync::Semaphore::MAX_PERMITS;
