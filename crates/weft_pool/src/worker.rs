//! Single-threaded command workers.
//!
//! A [`CommandWorker`] owns one OS thread running a current-thread tokio
//! runtime. Commands submitted to it run one at a time, in submission order,
//! on that thread; futures spawned on it are driven by the same runtime in
//! between commands. Anything that only ever touches its state from within
//! the worker therefore needs no further synchronization.
//!
//! [`WorkerPool`] is a [`LeasePool`] of workers, so several execution
//! sessions can share a bounded set of threads.

use core::fmt;
use core::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle};
use tokio::sync::mpsc;

use crate::error::PoolError;
use crate::lease::{LeasePool, PoolConfig};

type Command = Box<dyn FnOnce() + Send + 'static>;

/// A dedicated thread that runs submitted commands sequentially.
pub struct CommandWorker {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    handle: Handle,
}

impl CommandWorker {
    /// Starts a worker thread with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Create`] if the runtime or the thread cannot be started.
    pub fn spawn(name: impl Into<String>) -> Result<Self, PoolError> {
        let name = name.into();
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| PoolError::Create(err.to_string()))?;
        let handle = runtime.handle().clone();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Command>();

        let thread_name = name.clone();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let worker = thread_name.clone();
                runtime.block_on(async move {
                    while let Some(command) = receiver.recv().await {
                        if catch_unwind(AssertUnwindSafe(command)).is_err() {
                            tracing::error!(worker = %worker, "command panicked");
                        }
                    }
                });
                tracing::debug!(worker = %thread_name, "worker stopped");
            })
            .map_err(|err| PoolError::Create(err.to_string()))?;

        tracing::debug!(worker = %name, "worker started");
        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            handle,
        })
    }

    /// The worker's thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues a command to run on the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::WorkerStopped`] after [`shutdown`](Self::shutdown).
    pub fn submit<F>(&self, command: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock();
        let stopped = || PoolError::WorkerStopped(self.name.clone());
        sender
            .as_ref()
            .ok_or_else(stopped)?
            .send(Box::new(command))
            .map_err(|_| stopped())
    }

    /// Spawns a future on the worker's runtime.
    ///
    /// The future is polled on the worker thread, interleaved with commands.
    /// After shutdown the future is dropped without being polled.
    pub fn spawn_task<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(self.handle.spawn(future));
    }

    /// Stops accepting commands. Already queued commands still run, after
    /// which the thread exits.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            tracing::debug!(worker = %self.name, "worker shutting down");
        }
    }

    /// Returns `true` until [`shutdown`](Self::shutdown) is called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }
}

impl Drop for CommandWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for CommandWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandWorker")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WorkerPool
// ─────────────────────────────────────────────────────────────────────────────

/// A lease pool of [`CommandWorker`]s.
pub type WorkerPool = LeasePool<CommandWorker>;

/// Configuration for building a [`WorkerPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Lease pool configuration.
    pub pool: PoolConfig,
    /// Prefix for worker thread names; workers are named `{prefix}-{n}`.
    pub thread_name_prefix: String,
}

impl WorkerPoolConfig {
    /// Sets the lease pool configuration.
    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Sets the thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Builds the pool. Workers are started lazily on first lease.
    #[must_use]
    pub fn build(self) -> WorkerPool {
        let counter = Arc::new(AtomicUsize::new(0));
        let prefix = self.thread_name_prefix;
        LeasePool::new(
            self.pool,
            move || {
                let n = counter.fetch_add(1, Ordering::Relaxed);
                CommandWorker::spawn(format!("{prefix}-{n}"))
            },
            CommandWorker::shutdown,
        )
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            thread_name_prefix: "weft-worker".to_string(),
        }
    }
}
