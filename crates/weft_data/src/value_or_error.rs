//! The outcome of a single computation.

use core::error::Error;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::DataError;
use crate::value::Value;

/// Shared handle to a computation error.
///
/// Errors are compared and hashed by identity: two outcomes are equal only if
/// they carry the very same error instance.
pub type ErrorRef = Arc<dyn Error + Send + Sync + 'static>;

/// Either a value, an error, or neither. Never both.
///
/// An empty `ValueOrError` means the computation succeeded but produced no
/// value.
#[derive(Clone)]
pub struct ValueOrError<T = Value> {
    value: Option<T>,
    error: Option<ErrorRef>,
}

impl<T> ValueOrError<T> {
    /// An outcome carrying neither value nor error.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            value: None,
            error: None,
        }
    }

    /// A successful outcome.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn with_error<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::with_error_ref(Arc::new(error))
    }

    /// A failed outcome sharing an existing error.
    #[must_use]
    pub fn with_error_ref(error: ErrorRef) -> Self {
        Self {
            value: None,
            error: Some(error),
        }
    }

    /// Builds an outcome from optional parts.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::ValueAndError`] if both parts are present.
    pub fn try_new(value: Option<T>, error: Option<ErrorRef>) -> Result<Self, DataError> {
        if value.is_some() && error.is_some() {
            return Err(DataError::ValueAndError);
        }
        Ok(Self { value, error })
    }

    /// Converts a `Result` into an outcome.
    pub fn from_result<E>(result: Result<T, E>) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        match result {
            Ok(value) => Self::with_value(value),
            Err(error) => Self::with_error(error),
        }
    }

    /// The value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// The error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorRef> {
        self.error.as_ref()
    }

    /// Returns `true` if this outcome is a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns `true` if this outcome has neither value nor error.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.error.is_none()
    }

    /// Converts into a `Result`, keeping "no value" as `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the carried error if this outcome is a failure.
    pub fn into_result(self) -> Result<Option<T>, ErrorRef> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.value),
        }
    }

    /// Maps the value, leaving errors untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ValueOrError<U> {
        ValueOrError {
            value: self.value.map(f),
            error: self.error,
        }
    }
}

impl<T> Default for ValueOrError<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: PartialEq> PartialEq for ValueOrError<T> {
    fn eq(&self, other: &Self) -> bool {
        let same_error = match (&self.error, &other.error) {
            (Some(a), Some(b)) => core::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (None, None) => true,
            _ => false,
        };
        same_error && self.value == other.value
    }
}

impl<T: Eq> Eq for ValueOrError<T> {}

impl<T: Hash> Hash for ValueOrError<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
        self.error
            .as_ref()
            .map(|error| Arc::as_ptr(error).cast::<()>().addr())
            .hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueOrError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.value, &self.error) {
            (Some(value), _) => f.debug_tuple("Value").field(value).finish(),
            (None, Some(error)) => f.debug_tuple("Error").field(&error.to_string()).finish(),
            (None, None) => f.write_str("Empty"),
        }
    }
}

impl<T> From<Result<T, ErrorRef>> for ValueOrError<T> {
    fn from(result: Result<T, ErrorRef>) -> Self {
        match result {
            Ok(value) => Self::with_value(value),
            Err(error) => Self::with_error_ref(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn both_present_is_rejected() {
        let error: ErrorRef = Arc::new(Boom);
        let result = ValueOrError::try_new(Some(Value::new(1_u8)), Some(error));
        assert_eq!(result.err(), Some(DataError::ValueAndError));
    }

    #[test]
    fn try_new_accepts_single_part() {
        let voe = ValueOrError::try_new(Some(Value::new(1_u8)), None).expect("value only");
        assert_eq!(voe.value(), Some(&Value::new(1_u8)));
        assert!(!voe.is_error());

        let voe = ValueOrError::<Value>::try_new(None, None).expect("neither");
        assert!(voe.is_empty());
    }

    #[test]
    fn errors_compare_by_identity() {
        let shared: ErrorRef = Arc::new(Boom);
        let a = ValueOrError::<Value>::with_error_ref(shared.clone());
        let b = ValueOrError::<Value>::with_error_ref(shared);
        let c = ValueOrError::<Value>::with_error(Boom);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn into_result_keeps_empty_as_none() {
        assert_eq!(ValueOrError::<u8>::empty().into_result().ok(), Some(None));
        assert_eq!(ValueOrError::with_value(3_u8).into_result().ok(), Some(Some(3)));
        assert!(ValueOrError::<u8>::with_error(Boom).into_result().is_err());
    }

    #[test]
    fn from_result_maps_error() {
        let voe = ValueOrError::<u8>::from_result(Err::<u8, _>(Boom));
        assert!(voe.is_error());
        assert_eq!(voe.error().map(ToString::to_string).as_deref(), Some("boom"));
    }
}
