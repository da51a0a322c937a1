//! Errors raised by pools and workers.

/// Errors from leasing pooled objects or submitting work to a worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The pool has been closed and hands out no more leases.
    #[error("pool is closed")]
    Closed,
    /// The lease was already given back to the pool.
    #[error("lease has already been released")]
    Released,
    /// The pool could not create a new object.
    #[error("failed to create pooled object: {0}")]
    Create(String),
    /// The worker no longer accepts commands.
    #[error("worker '{0}' has stopped")]
    WorkerStopped(String),
}
