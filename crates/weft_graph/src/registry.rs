//! Registries of logic and node definitions.
//!
//! A [`NodeDefinitionRegistry`] is built once, validated, and shared by every
//! execution of the graph it describes.
//!
//! # Example
//!
//! ```ignore
//! let mut builder = NodeDefinitionRegistry::builder();
//! builder
//!     .add_main_logic(MainLogicDefinition::compute("greet", greet))
//!     .add_resolver("name_from_user", |inputs| ResolverCommand::execute_with(...))
//!     .add_node(NodeDefinition::new("greeter", "greet").with_input("name"));
//! let registry = builder.build()?;
//! ```

use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use indexmap::IndexMap;
use weft_data::Inputs;

use crate::definition::{MainLogicDefinition, NodeDefinition, ResolverCommand, ResolverLogic};
use crate::id::{LogicId, NodeId};

/// Errors detected while building a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Two nodes share an id.
    #[error("duplicate node: {0}")]
    DuplicateNode(NodeId),
    /// Two logic or resolver callbacks share an id.
    #[error("duplicate logic: {0}")]
    DuplicateLogic(LogicId),
    /// A node names a main logic that is not registered.
    #[error("node '{node}' uses unknown main logic '{logic}'")]
    UnknownMainLogic {
        /// The node.
        node: NodeId,
        /// The missing logic.
        logic: LogicId,
    },
    /// A node depends on a node that is not registered.
    #[error("node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependencyNode {
        /// The node.
        node: NodeId,
        /// The missing dependency node.
        dependency: NodeId,
    },
    /// A resolver feeds a dependency the node does not declare.
    #[error("resolver '{resolver}' on node '{node}' feeds undeclared dependency '{dependency}'")]
    UndeclaredDependency {
        /// The node.
        node: NodeId,
        /// The resolver.
        resolver: LogicId,
        /// The undeclared dependency name.
        dependency: String,
    },
    /// A node names a resolver callback that is not registered.
    #[error("node '{node}' uses unknown resolver '{resolver}'")]
    UnknownResolver {
        /// The node.
        node: NodeId,
        /// The missing resolver.
        resolver: LogicId,
    },
}

/// Registered main-logic and resolver callbacks.
#[derive(Default)]
pub struct LogicDefinitionRegistry {
    main_logic: HashMap<LogicId, Arc<MainLogicDefinition>>,
    resolvers: HashMap<LogicId, ResolverLogic>,
}

impl LogicDefinitionRegistry {
    /// Looks up a main-logic definition.
    #[must_use]
    pub fn main_logic(&self, logic_id: &LogicId) -> Option<&Arc<MainLogicDefinition>> {
        self.main_logic.get(logic_id)
    }

    /// Looks up a resolver callback.
    #[must_use]
    pub fn resolver(&self, resolver_id: &LogicId) -> Option<&ResolverLogic> {
        self.resolvers.get(resolver_id)
    }

    fn contains(&self, logic_id: &LogicId) -> bool {
        self.main_logic.contains_key(logic_id) || self.resolvers.contains_key(logic_id)
    }
}

/// Validated, immutable set of node definitions and their logic.
pub struct NodeDefinitionRegistry {
    nodes: IndexMap<NodeId, Arc<NodeDefinition>>,
    logic: LogicDefinitionRegistry,
}

impl NodeDefinitionRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Looks up a node definition.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&Arc<NodeDefinition>> {
        self.nodes.get(node_id)
    }

    /// Iterates over node definitions in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<NodeDefinition>> {
        self.nodes.values()
    }

    /// The logic registry.
    #[must_use]
    pub fn logic(&self) -> &LogicDefinitionRegistry {
        &self.logic
    }

    /// Main-logic definition of `node_id`.
    #[must_use]
    pub fn main_logic_of(&self, node_id: &NodeId) -> Option<&Arc<MainLogicDefinition>> {
        self.node(node_id)
            .and_then(|node| self.logic.main_logic(node.main_logic_id()))
    }
}

impl fmt::Debug for NodeDefinitionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDefinitionRegistry")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Collects definitions and validates them into a [`NodeDefinitionRegistry`].
///
/// Registration never fails; problems are reported by [`build`](Self::build).
#[derive(Default)]
pub struct RegistryBuilder {
    nodes: IndexMap<NodeId, Arc<NodeDefinition>>,
    logic: LogicDefinitionRegistry,
    errors: Vec<RegistryError>,
}

impl RegistryBuilder {
    /// Registers a main-logic definition.
    pub fn add_main_logic(&mut self, definition: MainLogicDefinition) -> &mut Self {
        let logic_id = definition.logic_id().clone();
        if self.logic.contains(&logic_id) {
            self.errors.push(RegistryError::DuplicateLogic(logic_id));
        } else {
            self.logic.main_logic.insert(logic_id, Arc::new(definition));
        }
        self
    }

    /// Registers a resolver callback.
    pub fn add_resolver<F>(&mut self, resolver_id: impl Into<LogicId>, resolver: F) -> &mut Self
    where
        F: Fn(&Inputs) -> ResolverCommand + Send + Sync + 'static,
    {
        let resolver_id = resolver_id.into();
        if self.logic.contains(&resolver_id) {
            self.errors.push(RegistryError::DuplicateLogic(resolver_id));
        } else {
            self.logic.resolvers.insert(resolver_id, Arc::new(resolver));
        }
        self
    }

    /// Registers a node definition.
    pub fn add_node(&mut self, definition: NodeDefinition) -> &mut Self {
        let node_id = definition.node_id().clone();
        if self.nodes.contains_key(&node_id) {
            self.errors.push(RegistryError::DuplicateNode(node_id));
        } else {
            self.nodes.insert(node_id, Arc::new(definition));
        }
        self
    }

    /// Validates every definition and produces the registry.
    ///
    /// # Errors
    ///
    /// Returns every problem found. Dependency cycles are allowed.
    pub fn build(self) -> Result<NodeDefinitionRegistry, Vec<RegistryError>> {
        let mut errors = self.errors;
        for node in self.nodes.values() {
            errors.extend(validate_node(node, &self.nodes, &self.logic));
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        tracing::debug!(nodes = self.nodes.len(), "built node definition registry");
        Ok(NodeDefinitionRegistry {
            nodes: self.nodes,
            logic: self.logic,
        })
    }
}

fn validate_node(
    node: &NodeDefinition,
    nodes: &IndexMap<NodeId, Arc<NodeDefinition>>,
    logic: &LogicDefinitionRegistry,
) -> Vec<RegistryError> {
    let mut errors = Vec::new();
    if logic.main_logic(node.main_logic_id()).is_none() {
        errors.push(RegistryError::UnknownMainLogic {
            node: node.node_id().clone(),
            logic: node.main_logic_id().clone(),
        });
    }
    for dependency in node.dependencies().values() {
        if !nodes.contains_key(dependency) {
            errors.push(RegistryError::UnknownDependencyNode {
                node: node.node_id().clone(),
                dependency: dependency.clone(),
            });
        }
    }
    for resolver in node.resolver_definitions() {
        if !node.dependencies().contains_key(resolver.dependency_name()) {
            errors.push(RegistryError::UndeclaredDependency {
                node: node.node_id().clone(),
                resolver: resolver.resolver_id().clone(),
                dependency: resolver.dependency_name().to_string(),
            });
        }
        if logic.resolver(resolver.resolver_id()).is_none() {
            errors.push(RegistryError::UnknownResolver {
                node: node.node_id().clone(),
                resolver: resolver.resolver_id().clone(),
            });
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ResolverDefinition;
    use weft_data::ValueOrError;

    fn noop(id: &str) -> MainLogicDefinition {
        MainLogicDefinition::compute(id, |_: &Inputs| ValueOrError::empty())
    }

    #[test]
    fn cycles_are_accepted() {
        let mut builder = NodeDefinitionRegistry::builder();
        builder
            .add_main_logic(noop("noop"))
            .add_node(NodeDefinition::new("a", "noop").with_dependency("b", "b"))
            .add_node(NodeDefinition::new("b", "noop").with_dependency("a", "a"));
        let registry = builder.build().expect("cyclic graph is valid");
        assert_eq!(registry.nodes().count(), 2);
        assert!(registry.main_logic_of(&NodeId::from("a")).is_some());
    }

    #[test]
    fn reports_every_problem() {
        let mut builder = NodeDefinitionRegistry::builder();
        builder
            .add_main_logic(noop("noop"))
            .add_main_logic(noop("noop"))
            .add_node(
                NodeDefinition::new("a", "missing")
                    .with_dependency("b", "ghost")
                    .with_resolver(ResolverDefinition::new("r", "c")),
            );
        let errors = builder.build().err().expect("invalid registry");
        assert_eq!(
            errors,
            vec![
                RegistryError::DuplicateLogic(LogicId::from("noop")),
                RegistryError::UnknownMainLogic {
                    node: NodeId::from("a"),
                    logic: LogicId::from("missing"),
                },
                RegistryError::UnknownDependencyNode {
                    node: NodeId::from("a"),
                    dependency: NodeId::from("ghost"),
                },
                RegistryError::UndeclaredDependency {
                    node: NodeId::from("a"),
                    resolver: LogicId::from("r"),
                    dependency: "c".to_string(),
                },
                RegistryError::UnknownResolver {
                    node: NodeId::from("a"),
                    resolver: LogicId::from("r"),
                },
            ]
        );
    }
}
