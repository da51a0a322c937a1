//! # Weft Internal Library
//!
//! Re-exports the core weft crates for convenience.

/// Layer 1: value containers.
pub use weft_data;

/// Layer 1: lease pools and command workers.
pub use weft_pool;

/// Layer 2: definitions and the execution engine.
pub use weft_graph;

/// Layer 3: tracing setup and built-in decorators.
pub use weft_core_plugins;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use weft_core_plugins::prelude::*;
    pub use weft_graph::prelude::*;
    pub use weft_pool::prelude::*;
}
