//! Node, logic and resolver definitions.
//!
//! Definitions are the static description of a graph:
//!
//! - [`MainLogicDefinition`] - a batch callback mapping input sets to future outcomes
//! - [`ResolverDefinition`] - how one dependency's inputs are computed from a node's inputs
//! - [`NodeDefinition`] - a node's main logic, declared inputs, dependencies and resolvers
//!
//! Definitions are registered in a
//! [`NodeDefinitionRegistry`](crate::registry::NodeDefinitionRegistry) and
//! never change afterwards.
//!
//! # Example
//!
//! ```ignore
//! let greet = MainLogicDefinition::compute("greet", |inputs| {
//!     let name = inputs.value::<String>("name").ok().flatten().unwrap_or_default();
//!     ValueOrError::with_value(Value::new(format!("hello {name}")))
//! });
//!
//! let node = NodeDefinition::new("greeter", "greet").with_input("name");
//! ```

use core::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use indexmap::{IndexMap, IndexSet};
use weft_data::{Inputs, ValueOrError};

use crate::decoration::DecoratorConfig;
use crate::id::{LogicId, NodeId};

/// Future outcome of one main-logic call.
pub type LogicFuture = BoxFuture<'static, ValueOrError>;

/// A batch main-logic callback: receives every input set of a batch and
/// returns one future outcome per input set.
pub type MainLogic = Arc<dyn Fn(&[Inputs]) -> IndexMap<Inputs, LogicFuture> + Send + Sync>;

/// A resolver callback: computes the inputs of one dependency call from the
/// inputs it is bound to.
pub type ResolverLogic = Arc<dyn Fn(&Inputs) -> ResolverCommand + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Resolvers
// ─────────────────────────────────────────────────────────────────────────────

/// What a resolver wants done with its dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverCommand {
    /// Do not call the dependency; it will be seen as having produced no results.
    Skip {
        /// Why the dependency is skipped.
        reason: String,
    },
    /// Call the dependency once per input set.
    MultiExecuteWith(Vec<Inputs>),
}

impl ResolverCommand {
    /// Skips the dependency.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        ResolverCommand::Skip {
            reason: reason.into(),
        }
    }

    /// Calls the dependency exactly once.
    #[must_use]
    pub fn execute_with(inputs: Inputs) -> Self {
        ResolverCommand::MultiExecuteWith(vec![inputs])
    }

    /// Calls the dependency once per input set.
    #[must_use]
    pub fn multi_execute_with(inputs: impl IntoIterator<Item = Inputs>) -> Self {
        ResolverCommand::MultiExecuteWith(inputs.into_iter().collect())
    }

    /// Returns `true` for [`ResolverCommand::Skip`].
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, ResolverCommand::Skip { .. })
    }
}

/// Binds a resolver callback to one dependency of a node.
///
/// The resolver runs once every input in `bound_from` is available and
/// produces values for `resolved_inputs` of the dependency named
/// `dependency_name`. A resolver with an empty `bound_from` runs as soon as the
/// node receives a request with no new inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverDefinition {
    resolver_id: LogicId,
    bound_from: IndexSet<String>,
    dependency_name: String,
    resolved_inputs: IndexSet<String>,
}

impl ResolverDefinition {
    /// Creates a resolver definition for `dependency_name`.
    pub fn new(resolver_id: impl Into<LogicId>, dependency_name: impl Into<String>) -> Self {
        Self {
            resolver_id: resolver_id.into(),
            bound_from: IndexSet::new(),
            dependency_name: dependency_name.into(),
            resolved_inputs: IndexSet::new(),
        }
    }

    /// Adds inputs of the owning node that the resolver reads.
    #[must_use]
    pub fn bound_from<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bound_from.extend(names.into_iter().map(Into::into));
        self
    }

    /// Adds inputs of the dependency that the resolver produces.
    #[must_use]
    pub fn resolves<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resolved_inputs.extend(names.into_iter().map(Into::into));
        self
    }

    /// Id of the resolver callback.
    #[must_use]
    pub fn resolver_id(&self) -> &LogicId {
        &self.resolver_id
    }

    /// Inputs of the owning node the resolver reads.
    #[must_use]
    pub fn bound_from_inputs(&self) -> &IndexSet<String> {
        &self.bound_from
    }

    /// The dependency the resolver feeds.
    #[must_use]
    pub fn dependency_name(&self) -> &str {
        &self.dependency_name
    }

    /// Inputs of the dependency the resolver produces.
    #[must_use]
    pub fn resolved_inputs(&self) -> &IndexSet<String> {
        &self.resolved_inputs
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Main logic
// ─────────────────────────────────────────────────────────────────────────────

/// A registered main-logic callback with its tags and decorator configuration.
#[derive(Clone)]
pub struct MainLogicDefinition {
    logic_id: LogicId,
    logic: MainLogic,
    logic_tags: Arc<IndexMap<String, String>>,
    session_scoped_decorators: Vec<DecoratorConfig>,
    request_scoped_decorators: Vec<DecoratorConfig>,
}

impl MainLogicDefinition {
    /// Creates a definition from a batch callback.
    pub fn new(logic_id: impl Into<LogicId>, logic: MainLogic) -> Self {
        Self {
            logic_id: logic_id.into(),
            logic,
            logic_tags: Arc::new(IndexMap::new()),
            session_scoped_decorators: Vec::new(),
            request_scoped_decorators: Vec::new(),
        }
    }

    /// Creates a definition from a synchronous per-input-set function.
    pub fn compute<F>(logic_id: impl Into<LogicId>, f: F) -> Self
    where
        F: Fn(&Inputs) -> ValueOrError + Send + Sync + 'static,
    {
        Self::new(
            logic_id,
            Arc::new(move |batch: &[Inputs]| {
                batch
                    .iter()
                    .map(|inputs| (inputs.clone(), future::ready(f(inputs)).boxed()))
                    .collect()
            }),
        )
    }

    /// Creates a definition from an asynchronous per-input-set function.
    pub fn asynchronous<F>(logic_id: impl Into<LogicId>, f: F) -> Self
    where
        F: Fn(&Inputs) -> LogicFuture + Send + Sync + 'static,
    {
        Self::new(
            logic_id,
            Arc::new(move |batch: &[Inputs]| {
                batch
                    .iter()
                    .map(|inputs| (inputs.clone(), f(inputs)))
                    .collect()
            }),
        )
    }

    /// Attaches a tag, replacing any previous value under the same key.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.logic_tags).insert(key.into(), value.into());
        self
    }

    /// Adds a decorator whose instances live as long as the graph.
    #[must_use]
    pub fn with_session_scoped_decorator(mut self, config: DecoratorConfig) -> Self {
        self.session_scoped_decorators.push(config);
        self
    }

    /// Adds a decorator whose instances live as long as one executor.
    #[must_use]
    pub fn with_request_scoped_decorator(mut self, config: DecoratorConfig) -> Self {
        self.request_scoped_decorators.push(config);
        self
    }

    /// The logic id.
    #[must_use]
    pub fn logic_id(&self) -> &LogicId {
        &self.logic_id
    }

    /// The undecorated callback.
    #[must_use]
    pub fn logic(&self) -> &MainLogic {
        &self.logic
    }

    /// Tags attached to this logic.
    #[must_use]
    pub fn logic_tags(&self) -> &Arc<IndexMap<String, String>> {
        &self.logic_tags
    }

    /// Session-scoped decorator configurations.
    #[must_use]
    pub fn session_scoped_decorators(&self) -> &[DecoratorConfig] {
        &self.session_scoped_decorators
    }

    /// Request-scoped decorator configurations.
    #[must_use]
    pub fn request_scoped_decorators(&self) -> &[DecoratorConfig] {
        &self.request_scoped_decorators
    }

    /// Runs the undecorated callback on a batch.
    #[must_use]
    pub fn execute(&self, batch: &[Inputs]) -> IndexMap<Inputs, LogicFuture> {
        (self.logic)(batch)
    }
}

impl fmt::Debug for MainLogicDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainLogicDefinition")
            .field("logic_id", &self.logic_id)
            .field("logic_tags", &self.logic_tags)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Nodes
// ─────────────────────────────────────────────────────────────────────────────

/// Static description of a node.
///
/// Declared inputs include the names of dependencies: a node's main logic
/// runs once every declared input has arrived, and dependency results arrive
/// as inputs under the dependency's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDefinition {
    node_id: NodeId,
    main_logic_id: LogicId,
    input_names: IndexSet<String>,
    dependencies: IndexMap<String, NodeId>,
    resolver_definitions: Vec<ResolverDefinition>,
}

impl NodeDefinition {
    /// Creates a node running `main_logic_id`, with no inputs or dependencies.
    pub fn new(node_id: impl Into<NodeId>, main_logic_id: impl Into<LogicId>) -> Self {
        Self {
            node_id: node_id.into(),
            main_logic_id: main_logic_id.into(),
            input_names: IndexSet::new(),
            dependencies: IndexMap::new(),
            resolver_definitions: Vec::new(),
        }
    }

    /// Declares an input supplied by callers.
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        self.input_names.insert(name.into());
        self
    }

    /// Declares several caller-supplied inputs.
    #[must_use]
    pub fn with_inputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declares a dependency on `node_id`, delivered as the input `name`.
    #[must_use]
    pub fn with_dependency(mut self, name: impl Into<String>, node_id: impl Into<NodeId>) -> Self {
        let name = name.into();
        self.input_names.insert(name.clone());
        self.dependencies.insert(name, node_id.into());
        self
    }

    /// Adds a resolver for one of the node's dependencies.
    #[must_use]
    pub fn with_resolver(mut self, resolver: ResolverDefinition) -> Self {
        self.resolver_definitions.push(resolver);
        self
    }

    /// The node id.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Id of the node's main logic.
    #[must_use]
    pub fn main_logic_id(&self) -> &LogicId {
        &self.main_logic_id
    }

    /// Every declared input, dependencies included.
    #[must_use]
    pub fn input_names(&self) -> &IndexSet<String> {
        &self.input_names
    }

    /// Declared inputs that are not dependencies.
    pub fn caller_input_names(&self) -> impl Iterator<Item = &String> {
        self.input_names
            .iter()
            .filter(|name| !self.dependencies.contains_key(name.as_str()))
    }

    /// Dependencies by input name.
    #[must_use]
    pub fn dependencies(&self) -> &IndexMap<String, NodeId> {
        &self.dependencies
    }

    /// Resolver definitions, in declaration order.
    #[must_use]
    pub fn resolver_definitions(&self) -> &[ResolverDefinition] {
        &self.resolver_definitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_data::Value;

    #[test]
    fn dependencies_are_declared_inputs() {
        let node = NodeDefinition::new("order", "load_order")
            .with_input("order_id")
            .with_dependency("items", "item");
        assert!(node.input_names().contains("items"));
        assert_eq!(
            node.caller_input_names().collect::<Vec<_>>(),
            vec!["order_id"]
        );
        assert_eq!(node.dependencies().get("items"), Some(&NodeId::from("item")));
    }

    #[tokio::test]
    async fn compute_logic_returns_one_future_per_input_set() {
        let logic = MainLogicDefinition::compute("double", |inputs: &Inputs| {
            let n = inputs.value_or("n", 0_i64).unwrap_or_default();
            ValueOrError::with_value(Value::new(n * 2))
        });
        let a = Inputs::empty().with("n", Value::new(2_i64));
        let b = Inputs::empty().with("n", Value::new(5_i64));

        let mut results = logic.execute(&[a.clone(), b.clone()]);
        assert_eq!(results.len(), 2);
        let out = results.swap_remove(&b).expect("entry for b").await;
        assert_eq!(out.value(), Some(&Value::new(10_i64)));
    }

    #[test]
    fn tags_accumulate() {
        let logic = MainLogicDefinition::compute("noop", |_: &Inputs| ValueOrError::empty())
            .with_tag("team", "checkout")
            .with_tag("tier", "1");
        assert_eq!(logic.logic_tags().get("team").map(String::as_str), Some("checkout"));
        assert_eq!(logic.logic_tags().len(), 2);
    }
}
