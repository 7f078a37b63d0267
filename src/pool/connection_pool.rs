//! Connection pool with a warm floor and a hard ceiling

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::factory::ConnectionFactory;
use crate::{PoolError, Result};

use super::state::{self, CheckIn, Checkout, Detach, PoolState, SlotReservation};
use super::stats::{PoolMetrics, PoolStatus};
use super::MAX_OPEN_LIMIT;

/// Pool of connections produced by a [`ConnectionFactory`]
///
/// Lifecycle is one-way: the pool is open after construction and closed
/// for good once [`ConnectionPool::shutdown`] succeeds.
pub struct ConnectionPool<F: ConnectionFactory> {
    config: PoolConfig,
    factory: F,
    state: Mutex<PoolState<F::Connection>>,
    /// One permit per connection a caller may still take: idle + spare capacity
    permits: Semaphore,
    metrics: PoolMetrics,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create a pool and warm up `min_open` connections
    ///
    /// Factory failures during warm-up are logged and skipped, so the pool
    /// may start with fewer idle connections than `min_open`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the limits are invalid
    pub async fn new(config: PoolConfig, factory: F) -> Result<Self> {
        config.validate()?;
        if config.max_open > MAX_OPEN_LIMIT {
            return Err(PoolError::InvalidConfig(format!(
                "max_open ({}) exceeds limit of {MAX_OPEN_LIMIT}",
                config.max_open
            )));
        }

        let metrics = PoolMetrics::default();
        let mut idle = VecDeque::with_capacity(config.max_open);

        for attempt in 0..config.min_open {
            match factory.connect().await {
                Ok(conn) => {
                    metrics.record_created();
                    idle.push_back(conn);
                }
                Err(e) => {
                    metrics.record_warmup_failure();
                    warn!("Warm-up connection {} failed: {}", attempt + 1, e);
                }
            }
        }

        info!(
            "Connection pool ready: {} warm, min_open {}, max_open {}",
            idle.len(),
            config.min_open,
            config.max_open
        );

        Ok(Self {
            permits: Semaphore::new(config.max_open),
            state: Mutex::new(PoolState::new(idle)),
            config,
            factory,
            metrics,
        })
    }

    /// Create a pool from explicit limits
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the limits are invalid
    pub async fn with_limits(
        min_open: usize,
        max_open: usize,
        max_lifetime: Duration,
        factory: F,
    ) -> Result<Self> {
        let config = PoolConfig::new(min_open, max_open).with_max_lifetime(max_lifetime);
        Self::new(config, factory).await
    }

    /// Take a connection, waiting for one if the pool is at `max_open`
    ///
    /// Waits at most the configured `acquire_timeout`, or indefinitely if
    /// none is set. Dropping the returned future abandons the wait without
    /// affecting the pool.
    ///
    /// # Errors
    ///
    /// Returns `PoolClosed` after shutdown, `Timeout` if the configured
    /// deadline passes, or the factory's error if a new connection fails
    pub async fn acquire(&self) -> Result<F::Connection> {
        match self.config.acquire_timeout() {
            Some(timeout) => self.acquire_timeout(timeout).await,
            None => self.checkout().await,
        }
    }

    /// Take a connection, waiting no longer than `timeout`
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if no connection is available in time, otherwise
    /// as [`ConnectionPool::acquire`]
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<F::Connection> {
        if let Ok(result) = tokio::time::timeout(timeout, self.checkout()).await {
            result
        } else {
            self.metrics.record_timeout();
            debug!("Acquire timed out after {:?}", timeout);
            Err(PoolError::Timeout(timeout))
        }
    }

    async fn checkout(&self) -> Result<F::Connection> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }

        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PoolError::PoolClosed)?;

        let checkout = state::lock(&self.state).checkout();
        match checkout {
            Checkout::Idle(conn) => {
                permit.forget();
                Ok(conn)
            }
            Checkout::Reserved => {
                let reservation = SlotReservation::new(&self.state, permit);
                let conn = self.factory.connect().await.map_err(PoolError::factory)?;
                reservation.commit();
                self.metrics.record_created();
                debug!("Opened new connection");
                Ok(conn)
            }
            Checkout::Closed => Err(PoolError::PoolClosed),
        }
    }

    /// Hand a connection back
    ///
    /// Above `min_open` the connection is closed instead of kept idle.
    /// A handle returned while nothing is checked out cannot belong to this
    /// pool; it is closed and leaves the pool's counts untouched.
    ///
    /// # Errors
    ///
    /// Returns `PoolClosed` after shutdown (the handle is dropped without
    /// being closed), or the close error if the connection was shed
    pub async fn release(&self, conn: F::Connection) -> Result<()> {
        let check_in = state::lock(&self.state).check_in(conn, self.config.min_open);
        match check_in {
            CheckIn::Recycled => {
                self.permits.add_permits(1);
                self.metrics.record_recycled();
                Ok(())
            }
            CheckIn::Shed(conn) => {
                self.permits.add_permits(1);
                debug!("Shedding connection above min_open {}", self.config.min_open);
                self.destroy(conn).await
            }
            CheckIn::Untracked(conn) => {
                warn!("Released a connection the pool does not track, closing it");
                self.destroy(conn).await
            }
            CheckIn::Closed(conn) => {
                debug!("Release after shutdown, dropping connection");
                drop(conn);
                Err(PoolError::PoolClosed)
            }
        }
    }

    /// Close a checked-out connection and stop tracking it
    ///
    /// The slot is freed even if the factory's close fails.
    ///
    /// # Errors
    ///
    /// Returns `PoolClosed` after shutdown (the handle is dropped without
    /// being closed), or the close error verbatim
    pub async fn close(&self, conn: F::Connection) -> Result<()> {
        let detach = state::lock(&self.state).detach();
        match detach {
            Detach::Counted => self.permits.add_permits(1),
            Detach::Untracked => warn!("Closing a connection the pool does not track"),
            Detach::Closed => {
                drop(conn);
                return Err(PoolError::PoolClosed);
            }
        }

        self.destroy(conn).await
    }

    async fn destroy(&self, conn: F::Connection) -> Result<()> {
        self.metrics.record_destroyed();
        self.factory.close(conn).await.map_err(PoolError::close)
    }

    /// Close every idle connection and refuse further use
    ///
    /// Callers waiting in `acquire` are woken with `PoolClosed`. Connections
    /// currently checked out are not touched.
    ///
    /// # Errors
    ///
    /// Returns `PoolClosed` if the pool was already shut down
    pub async fn shutdown(&self) -> Result<()> {
        let drained = state::lock(&self.state)
            .shut_down()
            .ok_or(PoolError::PoolClosed)?;
        self.permits.close();

        info!("Shutting down connection pool, closing {} idle", drained.len());

        for conn in drained {
            if let Err(e) = self.destroy(conn).await {
                debug!("Ignoring close error during shutdown: {}", e);
            }
        }

        let remaining = state::lock(&self.state).num_open;
        if remaining > 0 {
            info!("{} connections still checked out at shutdown", remaining);
        }

        Ok(())
    }

    /// Snapshot of current pool occupancy
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = state::lock(&self.state);
        PoolStatus {
            max_open: self.config.max_open,
            min_open: self.config.min_open,
            num_open: state.num_open,
            pending: state.pending,
            idle: state.idle.len(),
            in_use: state.checked_out(),
            closed: state.closed,
        }
    }

    /// Lifetime counters
    #[must_use]
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    /// Number of open connections (idle + checked out)
    #[must_use]
    pub fn num_open(&self) -> usize {
        state::lock(&self.state).num_open
    }

    /// Number of idle connections
    #[must_use]
    pub fn idle_count(&self) -> usize {
        state::lock(&self.state).idle.len()
    }

    /// Whether shutdown has run
    #[must_use]
    pub fn is_closed(&self) -> bool {
        state::lock(&self.state).closed
    }

    /// Configured maximum connection age
    ///
    /// Reserved for age-based recycling; the pool does not enforce it.
    #[must_use]
    pub fn max_lifetime(&self) -> Option<Duration> {
        self.config.max_lifetime()
    }

    /// Pool configuration
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Underlying connection factory
    #[must_use]
    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<F: ConnectionFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(
    ConnectionPool<crate::simulated::SimulatedFactory>: Send, Sync
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedFactory;
    use std::sync::Arc;

    async fn pool(min_open: usize, max_open: usize) -> ConnectionPool<Arc<SimulatedFactory>> {
        let factory = Arc::new(SimulatedFactory::new());
        ConnectionPool::new(PoolConfig::new(min_open, max_open), factory)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_construct_warms_min_open() {
        let pool = pool(2, 5).await;

        assert_eq!(pool.num_open(), 2);
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.factory().live_count(), 2);
        assert_eq!(pool.metrics().created(), 2);
    }

    #[tokio::test]
    async fn test_construct_rejects_invalid_limits() {
        let factory = SimulatedFactory::new();
        let err = ConnectionPool::new(PoolConfig::new(5, 3), factory)
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));

        let factory = SimulatedFactory::new();
        let err = ConnectionPool::new(PoolConfig::new(0, 0), factory)
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_warmup_failures_are_skipped() {
        let factory = Arc::new(SimulatedFactory::new());
        factory.fail_next_connects(2);

        let pool = ConnectionPool::new(PoolConfig::new(3, 5), Arc::clone(&factory))
            .await
            .unwrap();

        assert_eq!(pool.num_open(), 1);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.metrics().warmup_failures(), 2);
    }

    #[tokio::test]
    async fn test_acquire_reuses_idle() {
        let pool = pool(1, 2).await;

        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.id(), 1);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.num_open(), 1);

        pool.release(conn).await.unwrap();
        let again = pool.acquire().await.unwrap();
        assert_eq!(again.id(), 1);
        assert_eq!(pool.metrics().created(), 1);
    }

    #[tokio::test]
    async fn test_acquire_creates_up_to_max() {
        let pool = pool(0, 3).await;

        let mut held = Vec::new();
        for _ in 0..3 {
            held.push(pool.acquire().await.unwrap());
        }

        assert_eq!(pool.num_open(), 3);
        assert_eq!(pool.status().in_use, 3);
        assert!(pool
            .acquire_timeout(Duration::from_millis(20))
            .await
            .unwrap_err()
            .is_timeout());
        assert_eq!(pool.num_open(), 3);
        assert_eq!(pool.metrics().timeouts(), 1);
    }

    #[tokio::test]
    async fn test_factory_error_leaves_count_unchanged() {
        let pool = pool(0, 2).await;
        pool.factory().fail_next_connects(1);

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PoolError::Factory(_)));
        assert_eq!(pool.num_open(), 0);

        // capacity was returned with the failed reservation
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(pool.num_open(), 2);
    }

    #[tokio::test]
    async fn test_release_above_floor_closes() {
        let pool = pool(1, 3).await;

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!(pool.num_open(), 2);

        let b_id = b.id();
        pool.release(b).await.unwrap();

        assert_eq!(pool.num_open(), 1);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.factory().close_count(b_id), 1);

        pool.release(a).await.unwrap();
        assert_eq!(pool.num_open(), 1);
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_release_at_floor_recycles() {
        let pool = pool(2, 4).await;

        let conn = pool.acquire().await.unwrap();
        let id = conn.id();
        pool.release(conn).await.unwrap();

        assert_eq!(pool.num_open(), 2);
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.factory().close_count(id), 0);
        assert_eq!(pool.metrics().recycled(), 1);
    }

    #[tokio::test]
    async fn test_close_decrements_even_on_error() {
        let pool = pool(0, 1).await;
        let conn = pool.acquire().await.unwrap();

        pool.factory().set_fail_closes(true);
        let err = pool.close(conn).await.unwrap_err();

        assert!(matches!(err, PoolError::Close(_)));
        assert_eq!(pool.num_open(), 0);

        // the freed slot can be reused
        pool.factory().set_fail_closes(false);
        let conn = pool.acquire_timeout(Duration::from_millis(50)).await.unwrap();
        assert_eq!(conn.id(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_only() {
        let pool = pool(2, 4).await;
        let held = pool.acquire().await.unwrap();
        let extra = pool.acquire().await.unwrap();
        let third = pool.acquire().await.unwrap();
        pool.release(extra).await.unwrap();
        assert_eq!(pool.idle_count(), 0);
        pool.release(third).await.unwrap();

        pool.shutdown().await.unwrap();

        let status = pool.status();
        assert!(status.closed);
        assert_eq!(status.num_open, 1);
        assert_eq!(status.idle, 0);
        assert!(pool.factory().is_live(held.id()));

        assert!(pool.acquire().await.unwrap_err().is_closed());
        assert!(pool.release(held).await.unwrap_err().is_closed());
        assert!(pool.shutdown().await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_max_lifetime_is_reported() {
        let factory = SimulatedFactory::new();
        let pool = ConnectionPool::with_limits(0, 1, Duration::from_secs(300), factory)
            .await
            .unwrap();

        assert_eq!(pool.max_lifetime(), Some(Duration::from_secs(300)));
    }
}
