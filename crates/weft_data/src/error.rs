//! Errors raised while building or reading data containers.

/// Errors from constructing or inspecting [`ValueOrError`](crate::ValueOrError)
/// and [`Inputs`](crate::Inputs).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    /// A value and an error were both supplied for a single outcome.
    #[error("a ValueOrError cannot hold both a value and an error")]
    ValueAndError,
    /// The named input holds fan-out results, not a single value.
    #[error("input '{name}' holds dependency results, not a value")]
    NotAValue {
        /// Name of the input.
        name: String,
    },
    /// The named input holds a single value, not fan-out results.
    #[error("input '{name}' holds a value, not dependency results")]
    NotResults {
        /// Name of the input.
        name: String,
    },
    /// The stored value is of a different type than the one requested.
    #[error("input '{name}' is not of type {expected}")]
    TypeMismatch {
        /// Name of the input.
        name: String,
        /// Name of the requested type.
        expected: &'static str,
    },
}
