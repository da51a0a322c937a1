//! A request-scoped dataflow engine.
//!
//! Graphs are declared as logic nodes wired together through dependencies and
//! resolvers; an executor evaluates them for a single request, batching and
//! fanning out calls to dependencies as resolvers dictate.

pub use weft_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use weft_internal::prelude::*;
}
