//! Multi-lease object pools and single-threaded command workers.
//!
//! # Core Concepts
//!
//! - [`LeasePool`] - a pool whose objects may be leased to several holders at once
//! - [`Lease`] - a handle to a pooled object, returned to the pool on drop
//! - [`LeasePolicy`] - how the pool spreads leases over its objects
//! - [`CommandWorker`] - a dedicated thread that runs submitted commands one at a time
//! - [`WorkerPool`] - a lease pool of command workers
//!
//! # Example
//!
//! ```ignore
//! use weft_pool::{LeasePolicy, PoolConfig, WorkerPoolConfig};
//!
//! let pool = WorkerPoolConfig::default()
//!     .with_pool(PoolConfig::new(LeasePolicy::prefer(4)))
//!     .build();
//!
//! let lease = pool.lease()?;
//! lease.get()?.submit(|| tracing::info!("running on the worker"))?;
//! ```

/// Error type for pools and workers.
pub mod error;

/// Multi-lease object pool.
pub mod lease;

/// Single-threaded command workers.
pub mod worker;

pub use error::PoolError;
pub use lease::{Lease, LeasePolicy, LeasePool, PoolConfig, PoolMetrics};
pub use worker::{CommandWorker, WorkerPool, WorkerPoolConfig};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::error::PoolError;
    pub use crate::lease::{Lease, LeasePolicy, LeasePool, PoolConfig, PoolMetrics};
    pub use crate::worker::{CommandWorker, WorkerPool, WorkerPoolConfig};
}
