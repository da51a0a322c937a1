//! Request-scoped graph execution.
//!
//! A [`GraphExecutor`] runs nodes of an [`ExecutionGraph`](crate::graph::ExecutionGraph)
//! for one logical request. It leases one worker from the graph's pool and
//! routes every state change through it, so nodes never need locks of their
//! own.
//!
//! Execution is deferred: [`execute_node`](GraphExecutor::execute_node) only
//! registers the call. Nothing runs until [`flush`](GraphExecutor::flush) or
//! [`close`](GraphExecutor::close), which lets the engine see every call of a
//! request before deciding how to batch them.
//!
//! # Example
//!
//! ```ignore
//! let executor = graph.create_executor(ExecutorConfig::new("req-42"))?;
//!
//! let user = executor.execute_node_with_id("user", Inputs::empty().with("id", Value::new(7_u64)), "u")?;
//! let feed = executor.execute_node_with_id("feed", Inputs::empty().with("id", Value::new(7_u64)), "f")?;
//! executor.close()?;
//!
//! let (user, feed) = futures::join!(user, feed);
//! ```

use core::fmt;
use core::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{self, BoxFuture};
use hashbrown::HashMap;
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use weft_data::{ErrorRef, Inputs, Results, Value};
use weft_pool::{CommandWorker, Lease, PoolError};

use crate::chain::DependantChain;
use crate::command::{Flush, NodeOutcome, NodeRequestCommand};
use crate::decoration::{
    DecoratorCommand, DecoratorConfig, DecoratorInstances, LogicExecutionContext,
    MainLogicDecorator,
};
use crate::definition::MainLogicDefinition;
use crate::graph::GraphShared;
use crate::id::{LogicId, NodeId, RequestId};
use crate::node::{DependencyDelivery, Node, NodeContext};
use crate::promise::Promise;
use crate::registry::NodeDefinitionRegistry;

/// Errors that can occur while executing a graph.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    /// The executor has been closed.
    #[error("executor is closed and accepts no new executions")]
    Rejected,
    /// The requested node is not in the registry.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
    /// A node's main logic is not registered.
    #[error("node '{node}' uses unknown logic '{logic}'")]
    UnknownLogic {
        /// The node.
        node: NodeId,
        /// The missing logic.
        logic: LogicId,
    },
    /// A node's resolver callback is not registered.
    #[error("node '{node}' uses unknown resolver '{resolver}'")]
    UnknownResolver {
        /// The node.
        node: NodeId,
        /// The missing resolver.
        resolver: LogicId,
    },
    /// A resolver feeds a dependency the node does not declare.
    #[error("node '{node}' has no dependency named '{dependency}'")]
    UnknownDependency {
        /// The node.
        node: NodeId,
        /// The undeclared dependency.
        dependency: String,
    },
    /// Inputs were delivered twice to the same request.
    #[error("inputs {names:?} delivered twice to request '{request}' of node '{node}'")]
    DuplicateInputs {
        /// The node.
        node: NodeId,
        /// The request.
        request: RequestId,
        /// Names delivered twice.
        names: Vec<String>,
    },
    /// Dependency results were delivered twice to the same request.
    #[error("dependency '{dependency}' delivered twice to request '{request}' of node '{node}'")]
    DuplicateDependency {
        /// The node.
        node: NodeId,
        /// The request.
        request: RequestId,
        /// The dependency.
        dependency: String,
    },
    /// The request was skipped by a resolver.
    #[error("skipped: {reason}")]
    Skipped {
        /// Why the request was skipped.
        reason: String,
    },
    /// The node's logic failed.
    #[error("computation failed: {0}")]
    Computation(#[source] ErrorRef),
    /// The node's main logic returned no result for its inputs.
    #[error("main logic of node '{node}' returned no result for its inputs")]
    MissingLogicOutput {
        /// The node.
        node: NodeId,
    },
    /// The request was dropped before it completed.
    #[error("request was abandoned before completion")]
    Abandoned,
    /// The worker could not be leased or reached.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Outcome of a top-level node execution: the node's value, if it produced one.
pub type ExecutionResult = Result<Option<Value>, ExecutionError>;

/// Future of a top-level node execution.
pub type ExecutionFuture = BoxFuture<'static, ExecutionResult>;

/// Configuration for one [`GraphExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Root of every request id issued by the executor.
    pub request_id: String,
    /// Decorators instantiated per executor, in addition to those declared
    /// on each logic.
    pub request_scoped_decorators: Vec<DecoratorConfig>,
}

impl ExecutorConfig {
    /// Creates a configuration for the given request id.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            request_scoped_decorators: Vec::new(),
        }
    }

    /// Adds a request-scoped decorator applied to every node it matches.
    #[must_use]
    pub fn with_request_scoped_decorator(mut self, config: DecoratorConfig) -> Self {
        self.request_scoped_decorators.push(config);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session state
// ─────────────────────────────────────────────────────────────────────────────

/// Request-scoped decorator configuration, instances, and the chains through
/// which each node can be reached.
#[derive(Default)]
pub(crate) struct DecorationState {
    configs: Vec<DecoratorConfig>,
    instances: DecoratorInstances,
    chains_per_node: HashMap<NodeId, IndexSet<DependantChain>>,
}

impl DecorationState {
    fn record_chain(&mut self, node_id: &NodeId, chain: DependantChain) {
        self.chains_per_node
            .entry(node_id.clone())
            .or_default()
            .insert(chain);
    }

    pub(crate) fn chain_count(&self, node_id: &NodeId) -> usize {
        self.chains_per_node.get(node_id).map_or(0, IndexSet::len)
    }

    pub(crate) fn is_active(&self, node_id: &NodeId, chain: &DependantChain) -> bool {
        self.chains_per_node
            .get(node_id)
            .is_some_and(|chains| chains.contains(chain))
    }

    /// Request-scoped decorators matching `ctx`, keyed by type. Each one is
    /// told which chains currently reach the node.
    pub(crate) fn request_scoped_decorators(
        &mut self,
        logic: &MainLogicDefinition,
        ctx: &LogicExecutionContext,
    ) -> IndexMap<String, Arc<dyn MainLogicDecorator>> {
        let chains: Vec<DependantChain> = self
            .chains_per_node
            .get(&ctx.node_id)
            .map(|chains| chains.iter().cloned().collect())
            .unwrap_or_default();
        let mut decorators = IndexMap::new();
        for config in logic
            .request_scoped_decorators()
            .iter()
            .chain(self.configs.iter())
        {
            if !config.should_decorate(ctx) {
                continue;
            }
            let decorator = self.instances.get_or_create(config, ctx);
            decorator.execute_command(&DecoratorCommand::InitiateActiveDepChains {
                node_id: ctx.node_id.clone(),
                chains: chains.clone(),
            });
            decorators.insert(config.decorator_type().to_string(), decorator);
        }
        decorators
    }
}

/// A top-level call registered with [`GraphExecutor::execute_node`].
struct NodeExecution {
    node_id: NodeId,
    request_id: RequestId,
    inputs: Inputs,
    promise: Promise<ExecutionResult>,
}

struct SessionState {
    nodes: HashMap<NodeId, Node>,
    decoration: DecorationState,
    all_executions: Vec<NodeExecution>,
    unflushed: Vec<NodeExecution>,
}

struct SessionInner {
    graph: Arc<GraphShared>,
    worker: Arc<CommandWorker>,
    lease: Mutex<Option<Lease<CommandWorker>>>,
    request_id: RequestId,
    closed: AtomicBool,
    state: Mutex<SessionState>,
}

/// Shared handle to one executor's state. Cloned into worker commands and
/// continuations.
#[derive(Clone)]
pub(crate) struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn graph(&self) -> &GraphShared {
        &self.inner.graph
    }

    pub(crate) fn registry(&self) -> &Arc<NodeDefinitionRegistry> {
        self.inner.graph.registry()
    }

    pub(crate) fn spawn_task<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.worker.spawn_task(future);
    }

    fn submit<F>(&self, job: F) -> Result<(), ExecutionError>
    where
        F: FnOnce(&Session) + Send + 'static,
    {
        let session = self.clone();
        self.inner
            .worker
            .submit(move || job(&session))
            .map_err(ExecutionError::from)
    }

    /// Queues a request command on the worker. The command is queued
    /// immediately; the returned future only observes its outcome.
    pub(crate) fn enqueue_request(
        &self,
        command: NodeRequestCommand,
    ) -> BoxFuture<'static, NodeOutcome> {
        let (sender, receiver) = oneshot::channel();
        let queued = self.submit(move |session| {
            let promise = session.dispatch_request(command);
            let _ = sender.send(promise);
        });
        if let Err(error) = queued {
            return future::ready(Err(error)).boxed();
        }
        async move {
            match receiver.await {
                Ok(promise) => promise.future(Err(ExecutionError::Abandoned)).await,
                Err(_) => Err(ExecutionError::Abandoned),
            }
        }
        .boxed()
    }

    pub(crate) fn enqueue_flush(&self, flush: Flush) {
        let node_id = flush.node_id.clone();
        if let Err(error) = self.submit(move |session| session.dispatch_flush(flush)) {
            tracing::warn!(node = %node_id, %error, "could not queue flush");
        }
    }

    /// Queues delivery of a dependency's joined results.
    pub(crate) fn deliver(&self, delivery: DependencyDelivery, results: Results) {
        drop(self.enqueue_request(NodeRequestCommand::ExecuteWithDependency {
            node_id: delivery.node_id,
            request_id: delivery.request_id,
            dependency_name: delivery.dependency_name,
            results,
        }));
    }

    fn dispatch_request(&self, command: NodeRequestCommand) -> Promise<NodeOutcome> {
        let mut state = self.inner.state.lock();
        let SessionState {
            nodes, decoration, ..
        } = &mut *state;
        let Some(node) = nodes.get_mut(command.node_id()) else {
            let promise = Promise::new();
            promise.complete(Err(ExecutionError::UnknownNode(command.node_id().clone())));
            return promise;
        };
        let mut cx = NodeContext {
            session: self,
            decoration,
        };
        node.execute_request_command(command, &mut cx)
    }

    fn dispatch_flush(&self, flush: Flush) {
        let mut state = self.inner.state.lock();
        let SessionState {
            nodes, decoration, ..
        } = &mut *state;
        let Some(node) = nodes.get_mut(&flush.node_id) else {
            tracing::trace!(node = %flush.node_id, "flush for node that was never created");
            return;
        };
        let mut cx = NodeContext {
            session: self,
            decoration,
        };
        node.execute_flush(flush.dependant_chain, &mut cx);
    }

    /// Creates `node_id` and everything it can reach, recording the chain of
    /// every visit. Recursion stops at nodes already on the chain.
    fn create_dependant_nodes(
        &self,
        state: &mut SessionState,
        node_id: &NodeId,
        chain: DependantChain,
    ) -> Result<(), ExecutionError> {
        let registry = Arc::clone(self.registry());
        let definition = registry
            .node(node_id)
            .ok_or_else(|| ExecutionError::UnknownNode(node_id.clone()))?;

        if !chain.contains(node_id) {
            if !state.nodes.contains_key(node_id) {
                let logic = registry
                    .logic()
                    .main_logic(definition.main_logic_id())
                    .ok_or_else(|| ExecutionError::UnknownLogic {
                        node: node_id.clone(),
                        logic: definition.main_logic_id().clone(),
                    })?;
                state.nodes.insert(
                    node_id.clone(),
                    Node::new(Arc::clone(definition), Arc::clone(logic)),
                );
            }
            for (dependency_name, dependency_node) in definition.dependencies() {
                let dependency_chain = chain.extend(node_id.clone(), dependency_name.as_str());
                self.create_dependant_nodes(state, dependency_node, dependency_chain)?;
            }
        }
        state.decoration.record_chain(node_id, chain);
        Ok(())
    }

    fn register_execution(&self, execution: NodeExecution) {
        let mut state = self.inner.state.lock();
        if let Err(error) =
            self.create_dependant_nodes(&mut state, &execution.node_id, DependantChain::start())
        {
            tracing::debug!(node = %execution.node_id, %error, "execution rejected");
            execution.promise.complete(Err(error));
        }
        state.unflushed.push(NodeExecution {
            node_id: execution.node_id.clone(),
            request_id: execution.request_id.clone(),
            inputs: execution.inputs.clone(),
            promise: execution.promise.clone(),
        });
        state.all_executions.push(execution);
    }

    /// Hands every registered but unflushed execution to its node, then
    /// flushes those nodes on the top-level chain.
    fn flush_pending(&self) {
        let pending = core::mem::take(&mut self.inner.state.lock().unflushed);
        if pending.is_empty() {
            return;
        }
        tracing::debug!(request = %self.inner.request_id, executions = pending.len(), "flushing");

        for execution in &pending {
            if execution.promise.is_done() {
                continue;
            }
            let Some(definition) = self.registry().node(&execution.node_id) else {
                continue;
            };
            let response = self.enqueue_request(NodeRequestCommand::ExecuteWithInputs {
                node_id: execution.node_id.clone(),
                request_id: execution.request_id.clone(),
                input_names: definition.caller_input_names().cloned().collect(),
                inputs: execution.inputs.clone(),
                dependant_chain: DependantChain::start(),
            });
            let promise = execution.promise.clone();
            self.spawn_task(async move {
                let outcome = response.await.and_then(|response| {
                    response
                        .response
                        .into_result()
                        .map_err(ExecutionError::Computation)
                });
                promise.complete(outcome);
            });
        }
        for execution in &pending {
            self.enqueue_flush(Flush {
                node_id: execution.node_id.clone(),
                dependant_chain: DependantChain::start(),
            });
        }
    }

    /// Waits for every top-level execution, then gives the worker back.
    fn release_when_done(&self) {
        let pending: Vec<_> = self
            .inner
            .state
            .lock()
            .all_executions
            .iter()
            .map(|execution| execution.promise.future(Err(ExecutionError::Abandoned)))
            .collect();
        let session = self.clone();
        self.spawn_task(async move {
            future::join_all(pending).await;
            if let Some(lease) = session.inner.lease.lock().take() {
                tracing::debug!(request = %session.inner.request_id, "releasing worker");
                drop(lease);
            }
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GraphExecutor
// ─────────────────────────────────────────────────────────────────────────────

/// Executes nodes of a graph on behalf of one request.
///
/// Dropping the executor closes it.
pub struct GraphExecutor {
    session: Session,
}

impl GraphExecutor {
    pub(crate) fn new(
        graph: Arc<GraphShared>,
        lease: Lease<CommandWorker>,
        config: ExecutorConfig,
    ) -> Result<Self, ExecutionError> {
        let worker = lease.shared()?;
        let request_id = RequestId::new(config.request_id);
        tracing::debug!(request = %request_id, worker = worker.name(), "executor created");
        Ok(Self {
            session: Session {
                inner: Arc::new(SessionInner {
                    graph,
                    worker,
                    lease: Mutex::new(Some(lease)),
                    request_id,
                    closed: AtomicBool::new(false),
                    state: Mutex::new(SessionState {
                        nodes: HashMap::new(),
                        decoration: DecorationState {
                            configs: config.request_scoped_decorators,
                            ..DecorationState::default()
                        },
                        all_executions: Vec::new(),
                        unflushed: Vec::new(),
                    }),
                }),
            },
        })
    }

    /// The root request id.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.session.inner.request_id
    }

    /// Registers a call to `node_id` under the executor's root request id.
    ///
    /// The call runs at the next [`flush`](Self::flush) or
    /// [`close`](Self::close). Calling the same node twice this way is
    /// reported as duplicate inputs; use
    /// [`execute_node_with_id`](Self::execute_node_with_id) for repeated calls.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Rejected`] once the executor is closed, or
    /// [`ExecutionError::Pool`] if the worker is gone.
    pub fn execute_node(
        &self,
        node_id: impl Into<NodeId>,
        inputs: Inputs,
    ) -> Result<ExecutionFuture, ExecutionError> {
        let request_id = self.session.inner.request_id.clone();
        self.execute(node_id.into(), inputs, request_id)
    }

    /// Registers a call to `node_id` under a child request id derived from
    /// `execution_id`.
    ///
    /// # Errors
    ///
    /// Same as [`execute_node`](Self::execute_node).
    pub fn execute_node_with_id(
        &self,
        node_id: impl Into<NodeId>,
        inputs: Inputs,
        execution_id: impl fmt::Display,
    ) -> Result<ExecutionFuture, ExecutionError> {
        let request_id = self.session.inner.request_id.append(execution_id);
        self.execute(node_id.into(), inputs, request_id)
    }

    fn execute(
        &self,
        node_id: NodeId,
        inputs: Inputs,
        request_id: RequestId,
    ) -> Result<ExecutionFuture, ExecutionError> {
        if self.is_closed() {
            return Err(ExecutionError::Rejected);
        }
        tracing::trace!(node = %node_id, request = %request_id, "execution registered");
        let promise = Promise::new();
        let future = promise.future(Err(ExecutionError::Abandoned));
        let execution = NodeExecution {
            node_id,
            request_id,
            inputs,
            promise,
        };
        self.session
            .submit(move |session| session.register_execution(execution))?;
        Ok(future)
    }

    /// Runs every call registered since the last flush.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Pool`] if the worker is gone.
    pub fn flush(&self) -> Result<(), ExecutionError> {
        self.session.submit(Session::flush_pending)
    }

    /// Stops accepting calls, flushes, and releases the worker once every
    /// registered call has completed. Closing twice has no effect.
    ///
    /// `close` does not wait for the calls. Await the futures returned by
    /// [`execute_node`](Self::execute_node) to observe their completion.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Pool`] if the worker is gone.
    pub fn close(&self) -> Result<(), ExecutionError> {
        if self.session.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(request = %self.session.inner.request_id, "closing executor");
        self.flush()?;
        self.session.submit(Session::release_when_done)
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.session.inner.closed.load(Ordering::Acquire)
    }
}

impl Drop for GraphExecutor {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            tracing::warn!(request = %self.session.inner.request_id, %error, "failed to close executor");
        }
    }
}

impl fmt::Debug for GraphExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphExecutor")
            .field("request_id", &self.session.inner.request_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
