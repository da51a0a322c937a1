//! Per-node invocation metrics and tracing spans.
//!
//! [`InstrumentationDecorator`] opens a `main_logic` span around every
//! decorated invocation and records, per node, how many input sets were
//! computed, how many failed and how long they took to settle.
//!
//! # Example
//!
//! ```ignore
//! let metrics = InstrumentationMetrics::default();
//! let graph = ExecutionGraph::builder(registry)
//!     .with_session_scoped_decorator(InstrumentationDecorator::config(metrics.clone()))
//!     .build();
//!
//! // ... run some requests ...
//! let feed = metrics.node(&NodeId::from("feed")).unwrap_or_default();
//! tracing::info!(invocations = feed.invocations, "feed stats");
//! ```

use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::Instrument;
use weft_data::Inputs;
use weft_graph::{DecoratorConfig, MainLogic, MainLogicDecorator, NodeId};

/// Settled invocations of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeMetrics {
    /// Input sets computed.
    pub invocations: u64,
    /// Input sets whose outcome was an error.
    pub failures: u64,
    /// Time from invocation to settled outcome, summed over invocations.
    pub total_duration: Duration,
}

impl NodeMetrics {
    /// Mean settle time, or zero before the first invocation.
    #[must_use]
    pub fn mean_duration(&self) -> Duration {
        match u32::try_from(self.invocations) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(count) => self.total_duration / count,
        }
    }
}

/// Shared store of [`NodeMetrics`], keyed by node.
#[derive(Debug, Clone, Default)]
pub struct InstrumentationMetrics {
    nodes: Arc<Mutex<HashMap<NodeId, NodeMetrics>>>,
}

impl InstrumentationMetrics {
    /// Metrics of one node, if it has settled any invocation.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<NodeMetrics> {
        self.nodes.lock().get(node_id).copied()
    }

    /// Metrics of every node seen so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(NodeId, NodeMetrics)> {
        self.nodes
            .lock()
            .iter()
            .map(|(node_id, metrics)| (node_id.clone(), *metrics))
            .collect()
    }

    fn record(&self, node_id: &NodeId, elapsed: Duration, failed: bool) {
        let mut nodes = self.nodes.lock();
        let metrics = nodes.entry(node_id.clone()).or_default();
        metrics.invocations += 1;
        metrics.failures += u64::from(failed);
        metrics.total_duration += elapsed;
    }
}

/// Records spans and [`NodeMetrics`] for one node's main logic.
pub struct InstrumentationDecorator {
    decorator_id: String,
    node_id: NodeId,
    metrics: InstrumentationMetrics,
}

impl InstrumentationDecorator {
    /// Decorator type shared by every instance.
    pub const DECORATOR_TYPE: &'static str = "weft::instrumentation";

    /// Creates an instance recording into `metrics`.
    pub fn new(
        decorator_id: impl Into<String>,
        node_id: NodeId,
        metrics: InstrumentationMetrics,
    ) -> Self {
        Self {
            decorator_id: decorator_id.into(),
            node_id,
            metrics,
        }
    }

    /// A configuration creating one instance per node, all recording into
    /// `metrics`.
    #[must_use]
    pub fn config(metrics: InstrumentationMetrics) -> DecoratorConfig {
        DecoratorConfig::new(Self::DECORATOR_TYPE, move |ctx| {
            Arc::new(Self::new(
                ctx.instance_id,
                ctx.execution_context.node_id,
                metrics.clone(),
            )) as Arc<dyn MainLogicDecorator>
        })
        .with_instance_id(|ctx| ctx.node_id.to_string())
    }
}

impl MainLogicDecorator for InstrumentationDecorator {
    fn decorator_type(&self) -> &str {
        Self::DECORATOR_TYPE
    }

    fn decorator_id(&self) -> &str {
        &self.decorator_id
    }

    fn decorate(&self, logic: MainLogic) -> MainLogic {
        let node_id = self.node_id.clone();
        let metrics = self.metrics.clone();
        Arc::new(move |batch: &[Inputs]| {
            let span = tracing::debug_span!("main_logic", node = %node_id, batch = batch.len());
            let started = Instant::now();
            let outputs = span.in_scope(|| logic(batch));
            outputs
                .into_iter()
                .map(|(inputs, future)| {
                    let node_id = node_id.clone();
                    let metrics = metrics.clone();
                    let future = async move {
                        let outcome = future.await;
                        metrics.record(&node_id, started.elapsed(), outcome.is_error());
                        if let Some(error) = outcome.error() {
                            tracing::debug!(node = %node_id, %error, "main logic failed");
                        }
                        outcome
                    }
                    .instrument(span.clone())
                    .boxed();
                    (inputs, future)
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_data::{Value, ValueOrError};
    use weft_graph::MainLogicDefinition;

    #[test]
    fn mean_duration_of_no_invocations_is_zero() {
        assert_eq!(NodeMetrics::default().mean_duration(), Duration::ZERO);
        let metrics = NodeMetrics {
            invocations: 4,
            failures: 0,
            total_duration: Duration::from_millis(8),
        };
        assert_eq!(metrics.mean_duration(), Duration::from_millis(2));
    }

    #[test]
    fn records_every_settled_input_set() {
        let metrics = InstrumentationMetrics::default();
        let node_id = NodeId::from("square");
        let decorator = InstrumentationDecorator::new("square", node_id.clone(), metrics.clone());
        let logic = MainLogicDefinition::compute("square", |inputs| {
            match inputs.value_or("x", 0_i64) {
                Ok(x) if x >= 0 => ValueOrError::with_value(Value::new(x * x)),
                _ => ValueOrError::with_error(std::io::Error::other("negative")),
            }
        });

        let decorated = decorator.decorate(Arc::clone(logic.logic()));
        let batch = [
            Inputs::empty().with("x", Value::new(2_i64)),
            Inputs::empty().with("x", Value::new(-1_i64)),
        ];
        let outcomes: Vec<_> = decorated(&batch)
            .into_values()
            .map(futures::executor::block_on)
            .collect();

        assert_eq!(outcomes.len(), 2);
        let recorded = metrics.node(&node_id).expect("recorded");
        assert_eq!(recorded.invocations, 2);
        assert_eq!(recorded.failures, 1);
        assert_eq!(metrics.snapshot().len(), 1);
    }
}
