//! Cross-request input batching.
//!
//! [`InputBatchingDecorator`] holds back every main-logic call it wraps and
//! releases them as a single batch once the node can receive no more input:
//! when every dependant chain that reaches the node has been flushed. Logic
//! that fetches data in bulk gets one call per request instead of one per
//! input set.
//!
//! The decorator should be request-scoped, so that it is told which chains
//! reach its node. A session-scoped instance is never told and releases its
//! batch on every flush.
//!
//! # Example
//!
//! ```ignore
//! let executor = graph.create_executor(
//!     ExecutorConfig::new("req-1").with_request_scoped_decorator(
//!         InputBatchingDecorator::config()
//!             .with_predicate(|ctx| ctx.logic_tags.contains_key("batched")),
//!     ),
//! )?;
//! ```

use std::sync::Arc;

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::Shared;
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use weft_data::{Inputs, ValueOrError};
use weft_graph::{
    DecoratorCommand, DecoratorConfig, DependantChain, LogicFuture, MainLogic, MainLogicDecorator,
};

/// Errors produced for calls held by an [`InputBatchingDecorator`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchingError {
    /// The batched logic returned no result for these inputs.
    #[error("batched logic returned no result for the held inputs")]
    MissingOutput,
    /// The decorator was dropped before the batch was released.
    #[error("batch was dropped before it was released")]
    Dropped,
}

type SharedOutcome = Shared<LogicFuture>;

/// Calls held for one wrapped logic.
struct Batch {
    logic: MainLogic,
    waiting: IndexMap<Inputs, Vec<oneshot::Sender<SharedOutcome>>>,
}

impl Batch {
    fn release(self) {
        let inputs: Vec<Inputs> = self.waiting.keys().cloned().collect();
        tracing::debug!(batch = inputs.len(), "releasing batch");
        let mut outputs = (self.logic)(&inputs);
        for (inputs, senders) in self.waiting {
            let outcome = outputs
                .swap_remove(&inputs)
                .unwrap_or_else(|| {
                    futures::future::ready(ValueOrError::with_error(BatchingError::MissingOutput))
                        .boxed()
                })
                .shared();
            for sender in senders {
                // A dropped receiver means the caller stopped waiting.
                let _ = sender.send(outcome.clone());
            }
        }
    }
}

/// Held calls of one node. The batch runs through the first logic wrapper
/// seen; inner decorators may hand out a fresh wrapper per call.
#[derive(Default)]
struct BatchingState {
    batch: Option<Batch>,
    active_chains: IndexSet<DependantChain>,
    flushed_chains: IndexSet<DependantChain>,
}

impl BatchingState {
    fn batch_for(&mut self, logic: &MainLogic) -> &mut Batch {
        self.batch.get_or_insert_with(|| Batch {
            logic: Arc::clone(logic),
            waiting: IndexMap::new(),
        })
    }

    fn held(&self) -> usize {
        self.batch.as_ref().map_or(0, |batch| batch.waiting.len())
    }

    fn all_chains_flushed(&self) -> bool {
        self.active_chains
            .iter()
            .all(|chain| self.flushed_chains.contains(chain))
    }
}

/// Holds main-logic calls until every active dependant chain of the node
/// has been flushed, then runs them as one batch.
pub struct InputBatchingDecorator {
    decorator_id: String,
    max_batch_size: Option<usize>,
    state: Arc<Mutex<BatchingState>>,
}

impl InputBatchingDecorator {
    /// Decorator type shared by every instance.
    pub const DECORATOR_TYPE: &'static str = "weft::input_batching";

    /// Creates an unbounded batcher.
    pub fn new(decorator_id: impl Into<String>) -> Self {
        Self {
            decorator_id: decorator_id.into(),
            max_batch_size: None,
            state: Arc::new(Mutex::new(BatchingState::default())),
        }
    }

    /// Releases the batch early once it holds `size` distinct input sets.
    #[must_use]
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size.max(1));
        self
    }

    /// A configuration creating one unbounded batcher per node.
    #[must_use]
    pub fn config() -> DecoratorConfig {
        Self::config_with(None)
    }

    /// A configuration creating one batcher per node, each releasing early at
    /// `max_batch_size` held input sets.
    #[must_use]
    pub fn bounded_config(max_batch_size: usize) -> DecoratorConfig {
        Self::config_with(Some(max_batch_size))
    }

    fn config_with(max_batch_size: Option<usize>) -> DecoratorConfig {
        DecoratorConfig::new(Self::DECORATOR_TYPE, move |ctx| {
            let decorator = Self::new(ctx.instance_id);
            let decorator = match max_batch_size {
                Some(size) => decorator.with_max_batch_size(size),
                None => decorator,
            };
            Arc::new(decorator) as Arc<dyn MainLogicDecorator>
        })
        .with_instance_id(|ctx| ctx.node_id.to_string())
    }

    /// Number of input sets currently held.
    #[must_use]
    pub fn held(&self) -> usize {
        self.state.lock().held()
    }
}

impl MainLogicDecorator for InputBatchingDecorator {
    fn decorator_type(&self) -> &str {
        Self::DECORATOR_TYPE
    }

    fn decorator_id(&self) -> &str {
        &self.decorator_id
    }

    fn decorate(&self, logic: MainLogic) -> MainLogic {
        let state = Arc::clone(&self.state);
        let max_batch_size = self.max_batch_size;
        Arc::new(move |inputs: &[Inputs]| {
            let mut outputs = IndexMap::with_capacity(inputs.len());
            let full = {
                let mut state = state.lock();
                let batch = state.batch_for(&logic);
                for input_set in inputs {
                    let (sender, receiver) = oneshot::channel();
                    batch
                        .waiting
                        .entry(input_set.clone())
                        .or_default()
                        .push(sender);
                    let future: LogicFuture = async move {
                        match receiver.await {
                            Ok(outcome) => outcome.await,
                            Err(_) => ValueOrError::with_error(BatchingError::Dropped),
                        }
                    }
                    .boxed();
                    outputs.insert(input_set.clone(), future);
                }
                if max_batch_size.is_some_and(|max| state.held() >= max) {
                    state.batch.take()
                } else {
                    None
                }
            };
            if let Some(batch) = full {
                batch.release();
            }
            outputs
        })
    }

    fn execute_command(&self, command: &DecoratorCommand) {
        let ready = {
            let mut state = self.state.lock();
            match command {
                DecoratorCommand::InitiateActiveDepChains { chains, .. } => {
                    state.active_chains = chains.iter().cloned().collect();
                    return;
                }
                DecoratorCommand::Flush(chain) => {
                    state.flushed_chains.insert(chain.clone());
                    if !state.all_chains_flushed() {
                        tracing::trace!(
                            decorator = %self.decorator_id,
                            %chain,
                            "waiting for remaining chains"
                        );
                        return;
                    }
                    state.flushed_chains.clear();
                    state.batch.take()
                }
            }
        };
        if let Some(batch) = ready {
            batch.release();
        }
    }
}
