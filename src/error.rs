//! Error types for connpool

use std::time::Duration;
use thiserror::Error;

/// Boxed collaborator error (factory or close)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors that can occur in connpool
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool limits violate `max_open > 0` and `min_open <= max_open`
    #[error("Invalid pool config: {0}")]
    InvalidConfig(String),

    /// Operation attempted after shutdown
    #[error("Pool closed")]
    PoolClosed,

    /// No connection became available before the deadline
    #[error("Timed out after {0:?} waiting for a connection")]
    Timeout(Duration),

    /// Connection factory failed
    #[error("{0}")]
    Factory(#[source] BoxError),

    /// Closing a connection handle failed
    #[error("{0}")]
    Close(#[source] BoxError),

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PoolError {
    /// Wrap a factory error without altering it
    pub fn factory<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Factory(Box::new(err))
    }

    /// Wrap a close error without altering it
    pub fn close<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Close(Box::new(err))
    }

    /// Whether the pool has been shut down
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::PoolClosed)
    }

    /// Whether a bounded acquire expired
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Borrow the collaborator error, if this came from the factory or a close
    pub fn collaborator(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Factory(err) | Self::Close(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
