//! Type-erased values.
//!
//! A [`Value`] wraps any `'static` type that is hashable, comparable,
//! debuggable and thread-safe. Equality and hashing are delegated to the
//! concrete type, so values of different types never compare equal even if
//! their representations happen to match.

use core::any::TypeId;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Arc;

use downcast_rs::{DowncastSync, impl_downcast};

/// Object-safe view of a value stored inside a [`Value`].
///
/// Implemented for every `T: Hash + Eq + Debug + Send + Sync + 'static`;
/// there is no need to implement it by hand.
pub trait ErasedValue: DowncastSync + fmt::Debug {
    /// Compares against another erased value of possibly different type.
    fn dyn_eq(&self, other: &dyn ErasedValue) -> bool;

    /// Feeds the concrete type and value into `state`.
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl_downcast!(sync ErasedValue);

impl<T> ErasedValue for T
where
    T: Hash + Eq + fmt::Debug + Send + Sync + 'static,
{
    fn dyn_eq(&self, other: &dyn ErasedValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// A shared, immutable, type-erased value.
///
/// # Example
///
/// ```ignore
/// let v = Value::new(42_i64);
/// assert_eq!(v.downcast_ref::<i64>(), Some(&42));
/// assert!(v.downcast_ref::<String>().is_none());
/// ```
#[derive(Clone)]
pub struct Value(Arc<dyn ErasedValue>);

impl Value {
    /// Wraps a concrete value.
    pub fn new<T: ErasedValue>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Returns a reference to the inner value if it is of type `T`.
    #[must_use]
    pub fn downcast_ref<T: ErasedValue>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns `true` if the inner value is of type `T`.
    #[must_use]
    pub fn is<T: ErasedValue>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.dyn_eq(&*other.0)
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::DefaultHasher;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn downcast_to_stored_type() {
        let value = Value::new(String::from("hello"));
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("hello"));
        assert!(value.is::<String>());
        assert!(value.downcast_ref::<i32>().is_none());
    }

    #[test]
    fn equal_values_hash_equal() {
        let a = Value::new(7_u32);
        let b = Value::new(7_u32);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn same_bits_different_types_are_not_equal() {
        let a = Value::new(7_u32);
        let b = Value::new(7_i32);
        assert_ne!(a, b);
    }

    #[test]
    fn debug_shows_inner_value() {
        let value = Value::new(vec![1, 2, 3]);
        assert_eq!(format!("{value:?}"), "[1, 2, 3]");
    }
}
