//! The execution graph: a validated registry plus everything executors share.
//!
//! An [`ExecutionGraph`] owns the worker pool and the session-scoped
//! decorator instances. It is built once and hands out one
//! [`GraphExecutor`] per request.
//!
//! # Example
//!
//! ```ignore
//! let graph = ExecutionGraph::builder(registry)
//!     .with_ordering(DecorationOrdering::by_decorator_type(["batching", "instrumentation"]))
//!     .with_worker_pool(WorkerPoolConfig::default().with_thread_name_prefix("feed"))
//!     .build();
//!
//! let executor = graph.create_executor(ExecutorConfig::new("req-1"))?;
//! ```

use core::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use weft_pool::{WorkerPool, WorkerPoolConfig};

use crate::decoration::{
    DecorationOrdering, DecoratorConfig, DecoratorInstances, LogicExecutionContext,
    MainLogicDecorator,
};
use crate::definition::MainLogicDefinition;
use crate::executor::{ExecutionError, ExecutorConfig, GraphExecutor};
use crate::registry::NodeDefinitionRegistry;

/// State shared by every executor of one graph.
pub(crate) struct GraphShared {
    registry: Arc<NodeDefinitionRegistry>,
    ordering: DecorationOrdering,
    session_decorators: Vec<DecoratorConfig>,
    instances: Mutex<DecoratorInstances>,
}

impl GraphShared {
    pub(crate) fn registry(&self) -> &Arc<NodeDefinitionRegistry> {
        &self.registry
    }

    pub(crate) fn ordering(&self) -> &DecorationOrdering {
        &self.ordering
    }

    /// Session-scoped decorators matching `ctx`, keyed by type. Instances are
    /// created on first use and shared across executors.
    pub(crate) fn session_scoped_decorators(
        &self,
        logic: &MainLogicDefinition,
        ctx: &LogicExecutionContext,
    ) -> IndexMap<String, Arc<dyn MainLogicDecorator>> {
        let mut instances = self.instances.lock();
        logic
            .session_scoped_decorators()
            .iter()
            .chain(self.session_decorators.iter())
            .filter(|config| config.should_decorate(ctx))
            .map(|config| {
                (
                    config.decorator_type().to_string(),
                    instances.get_or_create(config, ctx),
                )
            })
            .collect()
    }
}

/// A validated graph ready to execute requests.
pub struct ExecutionGraph {
    shared: Arc<GraphShared>,
    pool: WorkerPool,
}

impl ExecutionGraph {
    /// Starts configuring a graph over `registry`.
    #[must_use]
    pub fn builder(registry: impl Into<Arc<NodeDefinitionRegistry>>) -> ExecutionGraphBuilder {
        ExecutionGraphBuilder {
            registry: registry.into(),
            ordering: DecorationOrdering::default(),
            session_decorators: Vec::new(),
            worker_pool: WorkerPoolConfig::default(),
        }
    }

    /// The registry the graph executes.
    #[must_use]
    pub fn registry(&self) -> &Arc<NodeDefinitionRegistry> {
        &self.shared.registry
    }

    /// Creates an executor for one request, leasing it a worker.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Pool`] if no worker can be leased.
    pub fn create_executor(&self, config: ExecutorConfig) -> Result<GraphExecutor, ExecutionError> {
        let lease = self.pool.lease()?;
        GraphExecutor::new(Arc::clone(&self.shared), lease, config)
    }

    /// The pool executors lease their workers from.
    #[must_use]
    pub fn worker_pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Shuts down every worker. Executors created afterwards fail.
    pub fn close(&self) {
        tracing::debug!("closing execution graph");
        self.pool.close();
    }
}

impl fmt::Debug for ExecutionGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionGraph")
            .field("registry", &self.shared.registry)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Configures an [`ExecutionGraph`].
pub struct ExecutionGraphBuilder {
    registry: Arc<NodeDefinitionRegistry>,
    ordering: DecorationOrdering,
    session_decorators: Vec<DecoratorConfig>,
    worker_pool: WorkerPoolConfig,
}

impl ExecutionGraphBuilder {
    /// Sets the order in which decorators are applied.
    #[must_use]
    pub fn with_ordering(mut self, ordering: DecorationOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Adds a session-scoped decorator applied to every node it matches.
    #[must_use]
    pub fn with_session_scoped_decorator(mut self, config: DecoratorConfig) -> Self {
        self.session_decorators.push(config);
        self
    }

    /// Configures the worker pool.
    #[must_use]
    pub fn with_worker_pool(mut self, config: WorkerPoolConfig) -> Self {
        self.worker_pool = config;
        self
    }

    /// Builds the graph.
    #[must_use]
    pub fn build(self) -> ExecutionGraph {
        ExecutionGraph {
            shared: Arc::new(GraphShared {
                registry: self.registry,
                ordering: self.ordering,
                session_decorators: self.session_decorators,
                instances: Mutex::new(DecoratorInstances::default()),
            }),
            pool: self.worker_pool.build(),
        }
    }
}

impl fmt::Debug for ExecutionGraphBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionGraphBuilder")
            .field("registry", &self.registry)
            .field("worker_pool", &self.worker_pool)
            .finish_non_exhaustive()
    }
}
