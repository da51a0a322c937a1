//! Main-logic decoration.
//!
//! A [`MainLogicDecorator`] wraps a node's [`MainLogic`] with cross-cutting
//! behavior: batching, caching, instrumentation. Decorators are declared with
//! a [`DecoratorConfig`], which decides per call site whether to decorate and
//! which decorator instance to use, and are applied in the order given by a
//! [`DecorationOrdering`].
//!
//! Decorators come in two scopes:
//!
//! - **Session-scoped** instances are created once per graph and shared by
//!   every executor.
//! - **Request-scoped** instances are created once per executor. A
//!   request-scoped decorator replaces any session-scoped decorator of the
//!   same type.
//!
//! The engine talks to decorator instances through [`DecoratorCommand`]s: it
//! announces which dependant chains can reach a node before the node's logic
//! runs, and signals when a chain has been flushed.
//!
//! # Example
//!
//! ```ignore
//! let config = DecoratorConfig::new("audit", |ctx| Arc::new(AuditDecorator::new(ctx)))
//!     .with_predicate(|ctx| ctx.logic_tags.contains_key("audited"))
//!     .with_instance_id(|ctx| ctx.node_id.to_string());
//! ```

use core::cmp::Ordering;
use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use indexmap::IndexMap;

use crate::chain::DependantChain;
use crate::definition::MainLogic;
use crate::id::NodeId;
use crate::registry::NodeDefinitionRegistry;

/// Commands the engine sends to decorator instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoratorCommand {
    /// Every request on `chain` has been handed to the node; nothing more will
    /// arrive on it until the next flush.
    Flush(DependantChain),
    /// The complete set of chains currently able to reach `node_id`.
    InitiateActiveDepChains {
        /// The node whose chains are listed.
        node_id: NodeId,
        /// Chains that reach the node.
        chains: Vec<DependantChain>,
    },
}

/// Wraps main logic with additional behavior.
pub trait MainLogicDecorator: Send + Sync {
    /// The kind of decorator. One request-scoped decorator replaces any
    /// session-scoped decorator of the same type.
    fn decorator_type(&self) -> &str;

    /// Identifier of this instance.
    fn decorator_id(&self) -> &str;

    /// Returns `logic` wrapped with this decorator's behavior.
    fn decorate(&self, logic: MainLogic) -> MainLogic;

    /// Handles a lifecycle command. The default ignores it.
    fn execute_command(&self, command: &DecoratorCommand) {
        let _ = command;
    }
}

impl fmt::Debug for dyn MainLogicDecorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainLogicDecorator")
            .field("type", &self.decorator_type())
            .field("id", &self.decorator_id())
            .finish()
    }
}

/// Where a main-logic call is being made from.
#[derive(Clone)]
pub struct LogicExecutionContext {
    /// The node whose logic is being called.
    pub node_id: NodeId,
    /// Tags on the node's main logic.
    pub logic_tags: Arc<IndexMap<String, String>>,
    /// The chain through which the node was reached.
    pub dependant_chain: DependantChain,
    /// The registry the node belongs to.
    pub registry: Arc<NodeDefinitionRegistry>,
}

impl fmt::Debug for LogicExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicExecutionContext")
            .field("node_id", &self.node_id)
            .field("logic_tags", &self.logic_tags)
            .field("dependant_chain", &self.dependant_chain)
            .finish_non_exhaustive()
    }
}

/// Passed to a decorator factory when an instance is created.
#[derive(Debug, Clone)]
pub struct DecoratorContext {
    /// Id chosen for the new instance.
    pub instance_id: String,
    /// The call site that triggered creation.
    pub execution_context: LogicExecutionContext,
}

type Predicate = Arc<dyn Fn(&LogicExecutionContext) -> bool + Send + Sync>;
type InstanceIdGenerator = Arc<dyn Fn(&LogicExecutionContext) -> String + Send + Sync>;
type Factory = Arc<dyn Fn(DecoratorContext) -> Arc<dyn MainLogicDecorator> + Send + Sync>;

/// Declares a decorator: when it applies, which instance to use and how to
/// build one.
///
/// By default the decorator applies everywhere and a single instance, named
/// after the decorator type, is shared by every call site in scope.
#[derive(Clone)]
pub struct DecoratorConfig {
    decorator_type: String,
    should_decorate: Predicate,
    instance_id: InstanceIdGenerator,
    factory: Factory,
}

impl DecoratorConfig {
    /// Creates a configuration for `decorator_type` built by `factory`.
    pub fn new<F>(decorator_type: impl Into<String>, factory: F) -> Self
    where
        F: Fn(DecoratorContext) -> Arc<dyn MainLogicDecorator> + Send + Sync + 'static,
    {
        let decorator_type = decorator_type.into();
        let default_id = decorator_type.clone();
        Self {
            decorator_type,
            should_decorate: Arc::new(|_| true),
            instance_id: Arc::new(move |_| default_id.clone()),
            factory: Arc::new(factory),
        }
    }

    /// Restricts the decorator to call sites matching `predicate`.
    #[must_use]
    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&LogicExecutionContext) -> bool + Send + Sync + 'static,
    {
        self.should_decorate = Arc::new(predicate);
        self
    }

    /// Chooses the instance id per call site. Call sites with the same id
    /// share one instance.
    #[must_use]
    pub fn with_instance_id<G>(mut self, generator: G) -> Self
    where
        G: Fn(&LogicExecutionContext) -> String + Send + Sync + 'static,
    {
        self.instance_id = Arc::new(generator);
        self
    }

    /// The decorator type.
    #[must_use]
    pub fn decorator_type(&self) -> &str {
        &self.decorator_type
    }

    /// Returns `true` if the decorator applies at this call site.
    #[must_use]
    pub fn should_decorate(&self, ctx: &LogicExecutionContext) -> bool {
        (self.should_decorate)(ctx)
    }

    /// The instance id for this call site.
    #[must_use]
    pub fn instance_id(&self, ctx: &LogicExecutionContext) -> String {
        (self.instance_id)(ctx)
    }

    /// Builds a new instance.
    #[must_use]
    pub fn create(&self, ctx: DecoratorContext) -> Arc<dyn MainLogicDecorator> {
        (self.factory)(ctx)
    }
}

impl fmt::Debug for DecoratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorConfig")
            .field("decorator_type", &self.decorator_type)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Instances
// ─────────────────────────────────────────────────────────────────────────────

/// Decorator instances keyed by `(type, instance id)`.
#[derive(Default)]
pub(crate) struct DecoratorInstances {
    instances: HashMap<(String, String), Arc<dyn MainLogicDecorator>>,
}

impl DecoratorInstances {
    /// Returns the instance for this call site, creating it on first use.
    pub(crate) fn get_or_create(
        &mut self,
        config: &DecoratorConfig,
        ctx: &LogicExecutionContext,
    ) -> Arc<dyn MainLogicDecorator> {
        let instance_id = config.instance_id(ctx);
        let key = (config.decorator_type().to_string(), instance_id.clone());
        Arc::clone(self.instances.entry(key).or_insert_with(|| {
            tracing::debug!(
                decorator_type = config.decorator_type(),
                instance_id = %instance_id,
                node = %ctx.node_id,
                "creating decorator instance"
            );
            config.create(DecoratorContext {
                instance_id: instance_id.clone(),
                execution_context: ctx.clone(),
            })
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ordering
// ─────────────────────────────────────────────────────────────────────────────

type Comparator =
    Arc<dyn Fn(&dyn MainLogicDecorator, &dyn MainLogicDecorator) -> Ordering + Send + Sync>;

/// Orders decorators for application.
///
/// Sorted decorators are applied first to last, so the last decorator is the
/// outermost wrapper and sees every call first. Flush commands travel in the
/// opposite direction, outermost first. Decorators that compare equal are
/// collapsed into one.
#[derive(Clone)]
pub struct DecorationOrdering {
    compare: Comparator,
}

impl DecorationOrdering {
    /// Orders decorators with a custom comparator.
    pub fn new<F>(compare: F) -> Self
    where
        F: Fn(&dyn MainLogicDecorator, &dyn MainLogicDecorator) -> Ordering + Send + Sync + 'static,
    {
        Self {
            compare: Arc::new(compare),
        }
    }

    /// Orders decorators by the position of their type in `types`, innermost
    /// first. Types not listed come last, ordered by name. Ties are broken by
    /// decorator id.
    pub fn by_decorator_type<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let positions: HashMap<String, usize> = types
            .into_iter()
            .enumerate()
            .map(|(position, ty)| (ty.into(), position))
            .collect();
        Self::new(move |a, b| {
            let rank = |d: &dyn MainLogicDecorator| positions.get(d.decorator_type()).copied();
            let by_type = match (rank(a), rank(b)) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.decorator_type().cmp(b.decorator_type()),
            };
            by_type.then_with(|| a.decorator_id().cmp(b.decorator_id()))
        })
    }

    /// Compares two decorators.
    #[must_use]
    pub fn compare(&self, a: &dyn MainLogicDecorator, b: &dyn MainLogicDecorator) -> Ordering {
        (self.compare)(a, b)
    }

    /// Sorts decorators, dropping any that compare equal to their predecessor.
    #[must_use]
    pub fn sort(
        &self,
        mut decorators: Vec<Arc<dyn MainLogicDecorator>>,
    ) -> Vec<Arc<dyn MainLogicDecorator>> {
        decorators.sort_by(|a, b| self.compare(a.as_ref(), b.as_ref()));
        decorators.dedup_by(|a, b| self.compare(a.as_ref(), b.as_ref()) == Ordering::Equal);
        decorators
    }
}

impl Default for DecorationOrdering {
    fn default() -> Self {
        Self::by_decorator_type(core::iter::empty::<String>())
    }
}

impl fmt::Debug for DecorationOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecorationOrdering").finish_non_exhaustive()
    }
}

/// Applies `decorators` to `logic`, first to last.
#[must_use]
pub fn decorate(logic: &MainLogic, decorators: &[Arc<dyn MainLogicDecorator>]) -> MainLogic {
    decorators
        .iter()
        .fold(Arc::clone(logic), |logic, decorator| decorator.decorate(logic))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        ty: &'static str,
        id: &'static str,
    }

    impl MainLogicDecorator for Named {
        fn decorator_type(&self) -> &str {
            self.ty
        }

        fn decorator_id(&self) -> &str {
            self.id
        }

        fn decorate(&self, logic: MainLogic) -> MainLogic {
            logic
        }
    }

    fn named(ty: &'static str, id: &'static str) -> Arc<dyn MainLogicDecorator> {
        Arc::new(Named { ty, id })
    }

    fn ids(decorators: &[Arc<dyn MainLogicDecorator>]) -> Vec<&str> {
        decorators.iter().map(|d| d.decorator_id()).collect()
    }

    #[test]
    fn orders_by_listed_type_then_unlisted() {
        let ordering = DecorationOrdering::by_decorator_type(["batch", "cache"]);
        let sorted = ordering.sort(vec![
            named("trace", "t"),
            named("cache", "c"),
            named("audit", "a"),
            named("batch", "b"),
        ]);
        assert_eq!(ids(&sorted), vec!["b", "c", "a", "t"]);
    }

    #[test]
    fn equal_decorators_are_collapsed() {
        let ordering = DecorationOrdering::default();
        let sorted = ordering.sort(vec![named("cache", "x"), named("cache", "x"), named("cache", "y")]);
        assert_eq!(ids(&sorted), vec!["x", "y"]);
    }
}
