//! Core infrastructure for weft applications.
//!
//! - [`TracingConfig`] - installs the global `tracing` subscriber
//! - [`InstrumentationDecorator`] - per-node spans and invocation metrics
//! - [`InputBatchingDecorator`] - runs the calls of a whole request as one batch
//!
//! # Example
//!
//! ```ignore
//! use weft_core_plugins::{InputBatchingDecorator, InstrumentationDecorator, InstrumentationMetrics, TracingConfig};
//! use tracing::Level;
//!
//! TracingConfig::default().with_level(Level::DEBUG).init();
//!
//! let metrics = InstrumentationMetrics::default();
//! let graph = ExecutionGraph::builder(registry)
//!     .with_ordering(DecorationOrdering::by_decorator_type([
//!         InputBatchingDecorator::DECORATOR_TYPE,
//!         InstrumentationDecorator::DECORATOR_TYPE,
//!     ]))
//!     .with_session_scoped_decorator(InstrumentationDecorator::config(metrics.clone()))
//!     .build();
//! ```

mod batching;
mod instrumentation;
mod tracing_setup;

pub use batching::{BatchingError, InputBatchingDecorator};
pub use instrumentation::{InstrumentationDecorator, InstrumentationMetrics, NodeMetrics};
pub use tracing_setup::{TracingConfig, TracingError, TracingFormat};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::batching::InputBatchingDecorator;
    pub use crate::instrumentation::{InstrumentationDecorator, InstrumentationMetrics};
    pub use crate::tracing_setup::{TracingConfig, TracingFormat};
}
