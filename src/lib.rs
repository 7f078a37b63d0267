//! Connpool - bounded async pool of reusable database connection handles
//!
//! Keeps a warm floor of idle connections, enforces a hard ceiling on open
//! ones and tears down cleanly on shutdown. Opening and closing connections
//! is delegated to a [`ConnectionFactory`].

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod error;
pub mod factory;
pub mod pool;
pub mod simulated;

pub use config::PoolConfig;
pub use error::{BoxError, PoolError, Result};
pub use factory::ConnectionFactory;
pub use pool::{ConnectionPool, PoolMetrics, PoolStatus};
