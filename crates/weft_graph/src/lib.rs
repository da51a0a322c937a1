//! Node definitions and the request-scoped execution engine.
//!
//! A weft graph is a set of named nodes. Each node runs one piece of main
//! logic over its inputs, some supplied by the caller and some produced by
//! other nodes it depends on. Resolvers decide, per request, which inputs a
//! dependency is called with and how many times.
//!
//! # Core Concepts
//!
//! - [`NodeDefinition`] - a node: its logic, inputs, dependencies and resolvers
//! - [`MainLogicDefinition`] - a batch-capable computation with tags and decorators
//! - [`NodeDefinitionRegistry`] - the validated set of nodes and logic
//! - [`ExecutionGraph`] - a registry bound to a worker pool and decorator instances
//! - [`GraphExecutor`] - runs nodes for one request, batching across calls
//! - [`MainLogicDecorator`] - wraps main logic with cross-cutting behavior
//!
//! # Example
//!
//! ```ignore
//! use weft_graph::prelude::*;
//!
//! let mut builder = NodeDefinitionRegistry::builder();
//! builder
//!     .add_main_logic(MainLogicDefinition::compute("greet", |inputs| {
//!         ValueOrError::from_result(
//!             inputs
//!                 .value_or("name", String::new())
//!                 .map(|name| Value::new(format!("hello {name}"))),
//!         )
//!     }))
//!     .add_node(NodeDefinition::new("greeter", "greet").with_input("name"));
//!
//! let graph = ExecutionGraph::builder(builder.build()?).build();
//! let executor = graph.create_executor(ExecutorConfig::new("req-1"))?;
//! let greeting = executor.execute_node("greeter", Inputs::empty().with("name", Value::new("weft".to_string())))?;
//! executor.close()?;
//! let greeting = greeting.await?;
//! ```

/// Dependant chains: the path by which a node was reached.
pub mod chain;

/// Commands exchanged between nodes.
pub mod command;

/// Main-logic decorators, their configuration and ordering.
pub mod decoration;

/// Node, main-logic and resolver definitions.
pub mod definition;

/// Request-scoped executors.
pub mod executor;

/// Execution graphs and their builder.
pub mod graph;

/// Identifiers.
pub mod id;

/// Definition registries.
pub mod registry;

mod node;
mod promise;

pub use chain::DependantChain;
pub use command::{NodeOutcome, NodeResponse};
pub use decoration::{
    DecorationOrdering, DecoratorCommand, DecoratorConfig, DecoratorContext,
    LogicExecutionContext, MainLogicDecorator, decorate,
};
pub use definition::{
    LogicFuture, MainLogic, MainLogicDefinition, NodeDefinition, ResolverCommand,
    ResolverDefinition, ResolverLogic,
};
pub use executor::{
    ExecutionError, ExecutionFuture, ExecutionResult, ExecutorConfig, GraphExecutor,
};
pub use graph::{ExecutionGraph, ExecutionGraphBuilder};
pub use id::{LogicId, NodeId, RequestId};
pub use registry::{
    LogicDefinitionRegistry, NodeDefinitionRegistry, RegistryBuilder, RegistryError,
};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::chain::DependantChain;
    pub use crate::decoration::{
        DecorationOrdering, DecoratorCommand, DecoratorConfig, DecoratorContext,
        LogicExecutionContext, MainLogicDecorator,
    };
    pub use crate::definition::{
        LogicFuture, MainLogic, MainLogicDefinition, NodeDefinition, ResolverCommand,
        ResolverDefinition,
    };
    pub use crate::executor::{ExecutionError, ExecutionFuture, ExecutorConfig, GraphExecutor};
    pub use crate::graph::ExecutionGraph;
    pub use crate::id::{LogicId, NodeId, RequestId};
    pub use crate::registry::{NodeDefinitionRegistry, RegistryError};
    pub use weft_data::prelude::*;
}
