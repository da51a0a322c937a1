//! Value containers exchanged between weft logic nodes.
//!
//! Every piece of data flowing through a graph is one of:
//!
//! - [`Value`] - a type-erased, hashable, comparable payload
//! - [`ValueOrError`] - the outcome of one computation: a value, an error, or nothing
//! - [`Inputs`] - a named set of input values, used as a cache key
//! - [`Results`] - the outcomes of a fanned-out dependency, keyed by the inputs of each call
//!
//! All containers are immutable once built and cheap to clone.
//!
//! # Example
//!
//! ```ignore
//! use weft_data::{Inputs, Value, ValueOrError};
//!
//! let inputs = Inputs::empty()
//!     .with("name", ValueOrError::with_value(Value::new("world".to_string())));
//!
//! let greeting = inputs.value::<String>("name")?;
//! ```

/// Error type for data access.
pub mod error;

/// Named input sets and fan-out results.
pub mod inputs;

/// Type-erased values.
pub mod value;

/// Value-or-error outcomes.
pub mod value_or_error;

pub use error::DataError;
pub use inputs::{InputValue, Inputs, Results};
pub use value::{ErasedValue, Value};
pub use value_or_error::{ErrorRef, ValueOrError};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::error::DataError;
    pub use crate::inputs::{InputValue, Inputs, Results};
    pub use crate::value::Value;
    pub use crate::value_or_error::{ErrorRef, ValueOrError};
}
