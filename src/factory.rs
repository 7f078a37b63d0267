//! Connection factory contract
//!
//! The pool never opens or tears down a connection itself. It goes through a
//! [`ConnectionFactory`] for both, so the backend (driver, network protocol,
//! health checks) stays outside the pool.

use std::future::Future;
use std::sync::Arc;

/// Creates and destroys connection handles on behalf of a pool
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Live connection handle
    type Connection: Send + 'static;
    /// Error reported by `connect` or `close`
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new connection
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Close a connection handle
    ///
    /// The handle is consumed, so it is closed at most once through the pool.
    fn close(
        &self,
        conn: Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl<F: ConnectionFactory> ConnectionFactory for Arc<F> {
    type Connection = F::Connection;
    type Error = F::Error;

    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        (**self).connect()
    }

    fn close(
        &self,
        conn: Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        (**self).close(conn)
    }
}
