//! Multi-lease object pool.
//!
//! A [`LeasePool`] hands out [`Lease`]s on pooled objects. Unlike a classic
//! object pool, an object may be leased to several holders at the same time;
//! the [`LeasePolicy`] decides how many, and whether the pool should pack
//! leases onto few objects or spread them over many.
//!
//! Objects that stay under-utilized for long enough are marked for deletion
//! and destroyed once their last lease is released.
//!
//! # Example
//!
//! ```ignore
//! let pool = LeasePool::new(
//!     PoolConfig::new(LeasePolicy::prefer(2)),
//!     || Ok(Connection::open()),
//!     |conn| conn.shutdown(),
//! );
//!
//! let a = pool.lease()?;
//! let b = pool.lease()?; // same connection as `a`
//! let c = pool.lease()?; // a new connection
//! ```

use core::fmt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::error::PoolError;

/// Default number of under-utilized releases after which an object is
/// marked for deletion.
pub const DEFAULT_DELETION_THRESHOLD: usize = 100;

/// How leases are spread over pooled objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeasePolicy {
    /// Reuse the same object until it holds `max_leases_per_object` leases.
    /// New objects go to the front of the pool so they are picked first.
    PreferObjectReuse {
        /// Maximum concurrent leases on one object.
        max_leases_per_object: usize,
    },
    /// Spread leases over up to `max_active_objects` objects. An object is
    /// reused once it holds `distribution_trigger` leases only when the pool
    /// is already at `max_active_objects`. New objects go to the back.
    DistributeLeases {
        /// Lease count at which the pool prefers another object.
        distribution_trigger: usize,
        /// Upper bound on the number of objects to spread over.
        max_active_objects: usize,
    },
}

impl LeasePolicy {
    /// Shorthand for [`LeasePolicy::PreferObjectReuse`].
    #[must_use]
    pub fn prefer(max_leases_per_object: usize) -> Self {
        LeasePolicy::PreferObjectReuse {
            max_leases_per_object,
        }
    }

    /// Shorthand for [`LeasePolicy::DistributeLeases`].
    #[must_use]
    pub fn distribute(distribution_trigger: usize, max_active_objects: usize) -> Self {
        LeasePolicy::DistributeLeases {
            distribution_trigger,
            max_active_objects,
        }
    }
}

impl Default for LeasePolicy {
    fn default() -> Self {
        LeasePolicy::prefer(1)
    }
}

/// Configuration for a [`LeasePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Lease distribution policy.
    pub policy: LeasePolicy,
    /// Number of under-utilized releases after which an object is marked for
    /// deletion.
    pub deletion_threshold: usize,
}

impl PoolConfig {
    /// Creates a configuration with the given policy and the default deletion threshold.
    #[must_use]
    pub fn new(policy: LeasePolicy) -> Self {
        Self {
            policy,
            deletion_threshold: DEFAULT_DELETION_THRESHOLD,
        }
    }

    /// Sets the deletion threshold.
    #[must_use]
    pub fn with_deletion_threshold(mut self, threshold: usize) -> Self {
        self.deletion_threshold = threshold;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(LeasePolicy::default())
    }
}

/// Peak utilization figures. Purely observational.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolMetrics {
    /// Highest number of concurrent leases seen on a single object.
    pub peak_leases_per_object: usize,
    /// Highest average number of active leases across queued objects.
    pub peak_avg_active_leases: f64,
    /// Highest number of queued objects.
    pub peak_pool_size: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Pool internals
// ─────────────────────────────────────────────────────────────────────────────

type Creator<T> = Box<dyn Fn() -> Result<T, PoolError> + Send + Sync>;
type Destroyer<T> = Box<dyn Fn(&T) + Send + Sync>;

struct PooledObject<T> {
    object: Arc<T>,
    /// Lease count at which the object counts as fully utilized.
    utilization_target: usize,
    active_leases: usize,
    under_utilized_releases: usize,
}

impl<T> PooledObject<T> {
    fn increment(&mut self) {
        self.active_leases += 1;
        if self.active_leases == self.utilization_target {
            self.under_utilized_releases = 0;
        }
    }

    fn decrement(&mut self) {
        self.active_leases = self.active_leases.saturating_sub(1);
        if self.active_leases < self.utilization_target {
            self.under_utilized_releases += 1;
        }
    }
}

struct PoolState<T> {
    queue: VecDeque<u64>,
    objects: HashMap<u64, PooledObject<T>>,
    next_id: u64,
    metrics: PoolMetrics,
}

struct PoolInner<T> {
    config: PoolConfig,
    creator: Creator<T>,
    destroyer: Destroyer<T>,
    closed: AtomicBool,
    state: Mutex<PoolState<T>>,
}

impl<T> PoolInner<T> {
    fn should_delete(&self, object: &PooledObject<T>) -> bool {
        object.under_utilized_releases > self.config.deletion_threshold
    }

    fn can_lease(&self, state: &PoolState<T>, id: u64) -> bool {
        let Some(object) = state.objects.get(&id) else {
            return false;
        };
        if self.should_delete(object) {
            return false;
        }
        match self.config.policy {
            LeasePolicy::PreferObjectReuse {
                max_leases_per_object,
            } => object.active_leases < max_leases_per_object,
            LeasePolicy::DistributeLeases {
                distribution_trigger,
                max_active_objects,
            } => {
                object.active_leases < distribution_trigger
                    || state.queue.len() == max_active_objects
            }
        }
    }

    fn pool_is_saturated(&self, state: &PoolState<T>) -> bool {
        matches!(
            self.config.policy,
            LeasePolicy::DistributeLeases { max_active_objects, .. }
                if max_active_objects == state.queue.len()
        )
    }

    /// Moves the head to the back of the queue if it cannot take a lease, or
    /// if the pool is spreading leases over a full set of objects. Heads marked
    /// for deletion leave the queue instead.
    fn rotate_head(&self, state: &mut PoolState<T>, head: u64) {
        if self.can_lease(state, head) && !self.pool_is_saturated(state) {
            return;
        }
        state.queue.pop_front();
        let evict = state
            .objects
            .get(&head)
            .is_some_and(|object| self.should_delete(object));
        if !evict {
            state.queue.push_back(head);
            return;
        }
        let idle = state
            .objects
            .get(&head)
            .is_some_and(|object| object.active_leases == 0);
        if idle && let Some(object) = state.objects.remove(&head) {
            tracing::debug!(object = head, "destroying idle pooled object marked for deletion");
            (self.destroyer)(&object.object);
        }
    }

    fn create_for_leasing(&self, state: &mut PoolState<T>) -> Result<u64, PoolError> {
        let object = (self.creator)()?;
        let id = state.next_id;
        state.next_id += 1;
        let mut pooled = PooledObject {
            object: Arc::new(object),
            utilization_target: state.metrics.peak_leases_per_object,
            active_leases: 0,
            under_utilized_releases: 0,
        };
        pooled.increment();
        state.objects.insert(id, pooled);
        match self.config.policy {
            LeasePolicy::PreferObjectReuse { .. } => state.queue.push_front(id),
            LeasePolicy::DistributeLeases { .. } => state.queue.push_back(id),
        }
        state.metrics.peak_pool_size = state.metrics.peak_pool_size.max(state.queue.len());
        tracing::debug!(object = id, pool_size = state.queue.len(), "created pooled object");
        Ok(id)
    }

    fn give_back(&self, id: u64) {
        let mut state = self.state.lock();
        let Some(object) = state.objects.get_mut(&id) else {
            return;
        };
        object.decrement();
        let destroy = object.active_leases == 0 && self.should_delete(object);
        if destroy && let Some(object) = state.objects.remove(&id) {
            state.queue.retain(|queued| *queued != id);
            tracing::debug!(object = id, "destroying released pooled object marked for deletion");
            (self.destroyer)(&object.object);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LeasePool
// ─────────────────────────────────────────────────────────────────────────────

/// A pool of objects that can each be leased by several holders at once.
///
/// Cloning a `LeasePool` yields another handle to the same pool.
pub struct LeasePool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for LeasePool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> LeasePool<T> {
    /// Creates an empty pool. `creator` builds new objects on demand,
    /// `destroyer` is called exactly once for every object the pool drops.
    pub fn new<C, D>(config: PoolConfig, creator: C, destroyer: D) -> Self
    where
        C: Fn() -> Result<T, PoolError> + Send + Sync + 'static,
        D: Fn(&T) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PoolInner {
                config,
                creator: Box::new(creator),
                destroyer: Box::new(destroyer),
                closed: AtomicBool::new(false),
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    objects: HashMap::new(),
                    next_id: 0,
                    metrics: PoolMetrics::default(),
                }),
            }),
        }
    }

    /// Leases an object, creating one if no pooled object can take the lease.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] if the pool is closed, or the creator's
    /// error if a new object was needed and could not be built.
    pub fn lease(&self) -> Result<Lease<T>, PoolError> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if inner.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }

        let mut remaining = state.queue.len();
        let mut head = None;
        while let Some(&candidate) = state.queue.front() {
            head = Some(candidate);
            inner.rotate_head(&mut state, candidate);
            remaining = remaining.saturating_sub(1);
            if remaining == 0 || inner.can_lease(&state, candidate) {
                break;
            }
        }

        let id = match head {
            Some(id) if inner.can_lease(&state, id) => {
                if let Some(object) = state.objects.get_mut(&id) {
                    object.increment();
                }
                id
            }
            _ => inner.create_for_leasing(&mut state)?,
        };

        let Some(leased) = state.objects.get(&id) else {
            return Err(PoolError::Released);
        };
        let object = Arc::clone(&leased.object);
        let active = leased.active_leases;
        let PoolState {
            queue,
            objects,
            metrics,
            ..
        } = &mut *state;
        metrics.peak_leases_per_object = metrics.peak_leases_per_object.max(active);
        if !queue.is_empty() {
            let total: usize = queue
                .iter()
                .filter_map(|queued| objects.get(queued))
                .map(|object| object.active_leases)
                .sum();
            let average = total as f64 / queue.len() as f64;
            metrics.peak_avg_active_leases = metrics.peak_avg_active_leases.max(average);
        }

        Ok(Lease {
            pool: Arc::clone(inner),
            id,
            object: Some(object),
        })
    }

    /// Closes the pool and destroys every pooled object, leased or not.
    ///
    /// Outstanding leases stay readable, but their objects have already been
    /// handed to the destroyer. Calling `close` again has no effect.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.inner.state.lock();
        state.queue.clear();
        let objects: Vec<_> = state.objects.drain().collect();
        drop(state);
        tracing::debug!(objects = objects.len(), "closing lease pool");
        for (_, object) in objects {
            (self.inner.destroyer)(&object.object);
        }
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of objects currently available for leasing.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Snapshot of the pool's peak utilization.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        self.inner.state.lock().metrics
    }

    /// The pool's configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl<T> fmt::Debug for LeasePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeasePool")
            .field("config", &self.inner.config)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lease
// ─────────────────────────────────────────────────────────────────────────────

/// A lease on a pooled object. Released explicitly or on drop.
pub struct Lease<T> {
    pool: Arc<PoolInner<T>>,
    id: u64,
    object: Option<Arc<T>>,
}

impl<T> Lease<T> {
    /// Borrows the leased object.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Released`] after [`release`](Self::release).
    pub fn get(&self) -> Result<&T, PoolError> {
        self.object.as_deref().ok_or(PoolError::Released)
    }

    /// Returns a shared handle to the leased object.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Released`] after [`release`](Self::release).
    pub fn shared(&self) -> Result<Arc<T>, PoolError> {
        self.object.clone().ok_or(PoolError::Released)
    }

    /// Gives the object back to the pool. Later calls have no effect.
    pub fn release(&mut self) {
        if self.object.take().is_some() {
            self.pool.give_back(self.id);
        }
    }

    /// Returns `true` once the lease has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.object.is_none()
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("object", &self.id)
            .field("released", &self.object.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_pool(config: PoolConfig) -> (LeasePool<usize>, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let pool = LeasePool::new(
            config,
            move || Ok(counter.fetch_add(1, Ordering::SeqCst)),
            |_| {},
        );
        (pool, created)
    }

    #[test]
    fn get_after_release_fails() {
        let (pool, _) = counting_pool(PoolConfig::default());
        let mut lease = pool.lease().expect("lease");
        assert_eq!(lease.get().copied(), Ok(0));
        lease.release();
        assert!(lease.is_released());
        assert_eq!(lease.get(), Err(PoolError::Released));
    }

    #[test]
    fn released_object_is_reused() {
        let (pool, created) = counting_pool(PoolConfig::new(LeasePolicy::prefer(1)));
        let first = pool.lease().expect("lease");
        drop(first);
        let second = pool.lease().expect("lease");
        assert_eq!(second.get().copied(), Ok(0));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lease_after_close_fails() {
        let (pool, _) = counting_pool(PoolConfig::default());
        pool.close();
        assert!(pool.is_closed());
        assert_eq!(pool.lease().err(), Some(PoolError::Closed));
    }

    #[test]
    fn creator_error_is_propagated() {
        let pool: LeasePool<usize> = LeasePool::new(
            PoolConfig::default(),
            || Err(PoolError::Create("no capacity".to_string())),
            |_| {},
        );
        assert_eq!(
            pool.lease().err(),
            Some(PoolError::Create("no capacity".to_string()))
        );
    }

    #[test]
    fn under_utilized_object_is_destroyed_on_last_release() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&destroyed);
        let created = AtomicUsize::new(0);
        let pool = LeasePool::new(
            PoolConfig::new(LeasePolicy::prefer(2)).with_deletion_threshold(1),
            move || Ok(created.fetch_add(1, Ordering::SeqCst)),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        // Saturate the first object so the second one is created with a
        // utilization target of two.
        let a1 = pool.lease().expect("lease");
        let a2 = pool.lease().expect("lease");
        let mut b = pool.lease().expect("lease");
        assert_eq!(b.get().copied(), Ok(1));

        // Two under-utilized releases of the second object cross the threshold.
        b.release();
        let b = pool.lease().expect("lease");
        assert_eq!(b.get().copied(), Ok(1));
        drop(b);

        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        drop((a1, a2));
    }
}
