//! Named input sets and fan-out results.
//!
//! [`Inputs`] and [`Results`] are used as cache keys throughout the engine,
//! so both implement order-insensitive equality and hashing: two input sets
//! with the same entries are equal regardless of insertion order.

use core::fmt;
use core::hash::{Hash, Hasher};
use std::hash::DefaultHasher;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::DataError;
use crate::value::{ErasedValue, Value};
use crate::value_or_error::ValueOrError;

/// The value of one named input.
///
/// Regular inputs carry a single outcome. Inputs fed by a dependency carry
/// the [`Results`] of every call made to that dependency.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum InputValue {
    /// A single outcome.
    Value(ValueOrError),
    /// Outcomes of a fanned-out dependency.
    Results(Results),
}

impl InputValue {
    /// Returns the single outcome, if this is not a dependency input.
    #[must_use]
    pub fn as_value(&self) -> Option<&ValueOrError> {
        match self {
            InputValue::Value(value) => Some(value),
            InputValue::Results(_) => None,
        }
    }

    /// Returns the dependency results, if this is a dependency input.
    #[must_use]
    pub fn as_results(&self) -> Option<&Results> {
        match self {
            InputValue::Results(results) => Some(results),
            InputValue::Value(_) => None,
        }
    }
}

impl Default for InputValue {
    fn default() -> Self {
        InputValue::Value(ValueOrError::empty())
    }
}

impl fmt::Debug for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Value(value) => fmt::Debug::fmt(value, f),
            InputValue::Results(results) => fmt::Debug::fmt(results, f),
        }
    }
}

impl From<ValueOrError> for InputValue {
    fn from(value: ValueOrError) -> Self {
        InputValue::Value(value)
    }
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        InputValue::Value(ValueOrError::with_value(value))
    }
}

impl From<Results> for InputValue {
    fn from(results: Results) -> Self {
        InputValue::Results(results)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inputs
// ─────────────────────────────────────────────────────────────────────────────

/// An immutable mapping from input name to [`InputValue`].
///
/// # Example
///
/// ```ignore
/// let inputs = Inputs::empty()
///     .with("user_id", Value::new(42_u64))
///     .with("locale", Value::new("en".to_string()));
///
/// assert_eq!(inputs.value::<u64>("user_id")?, Some(42));
/// assert_eq!(inputs.value_or("missing", 7_u64)?, 7);
/// ```
#[derive(Clone, Default)]
pub struct Inputs {
    values: Arc<IndexMap<String, InputValue>>,
}

impl Inputs {
    /// Creates an input set from a map.
    #[must_use]
    pub fn new(values: IndexMap<String, InputValue>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    /// An input set with no entries.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a copy with `name` set to `value`, replacing any previous entry.
    #[must_use]
    pub fn with(&self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        let mut values = (*self.values).clone();
        values.insert(name.into(), value.into());
        Self::new(values)
    }

    /// Merges two input sets. Entries in `second` win on conflicting names.
    #[must_use]
    pub fn union(first: &Inputs, second: &Inputs) -> Inputs {
        if first.is_empty() {
            return second.clone();
        }
        if second.is_empty() {
            return first.clone();
        }
        let mut values = (*first.values).clone();
        for (name, value) in second.iter() {
            values.insert(name.clone(), value.clone());
        }
        Self::new(values)
    }

    /// Returns the raw entry for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.values.get(name)
    }

    /// Returns `true` if `name` has an entry.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Returns the outcome for `name`, or an empty outcome if absent.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotAValue`] if the entry holds dependency results.
    pub fn value_or_error(&self, name: &str) -> Result<ValueOrError, DataError> {
        match self.values.get(name) {
            None => Ok(ValueOrError::empty()),
            Some(InputValue::Value(value)) => Ok(value.clone()),
            Some(InputValue::Results(_)) => Err(DataError::NotAValue {
                name: name.to_string(),
            }),
        }
    }

    /// Returns the value for `name` downcast to `T`.
    ///
    /// Absent entries, empty outcomes and failed outcomes all yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotAValue`] for dependency inputs and
    /// [`DataError::TypeMismatch`] if the stored value is not a `T`.
    pub fn value<T: ErasedValue + Clone>(&self, name: &str) -> Result<Option<T>, DataError> {
        let outcome = self.value_or_error(name)?;
        let Some(value) = outcome.value() else {
            return Ok(None);
        };
        value
            .downcast_ref::<T>()
            .cloned()
            .map(Some)
            .ok_or_else(|| DataError::TypeMismatch {
                name: name.to_string(),
                expected: core::any::type_name::<T>(),
            })
    }

    /// Like [`value`](Self::value), falling back to `default` when there is no value.
    ///
    /// # Errors
    ///
    /// Same as [`value`](Self::value).
    pub fn value_or<T: ErasedValue + Clone>(&self, name: &str, default: T) -> Result<T, DataError> {
        Ok(self.value(name)?.unwrap_or(default))
    }

    /// Returns the dependency results for `name`, or empty results if absent.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotResults`] if the entry holds a single value.
    pub fn results(&self, name: &str) -> Result<Results, DataError> {
        match self.values.get(name) {
            None => Ok(Results::empty()),
            Some(InputValue::Results(results)) => Ok(results.clone()),
            Some(InputValue::Value(_)) => Err(DataError::NotResults {
                name: name.to_string(),
            }),
        }
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &InputValue)> {
        self.values.iter()
    }

    /// Iterates over input names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for Inputs {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.values, &other.values) || *self.values == *other.values
    }
}

impl Eq for Inputs {}

impl Hash for Inputs {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.values.len());
        state.write_u64(unordered_hash(self.values.iter()));
    }
}

impl fmt::Debug for Inputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<InputValue>> FromIterator<(K, V)> for Inputs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

/// Outcomes of every call made to a dependency, keyed by the inputs the
/// dependency received for that call.
#[derive(Clone, Default)]
pub struct Results {
    entries: Arc<IndexMap<Inputs, ValueOrError>>,
}

impl Results {
    /// Creates results from a map.
    #[must_use]
    pub fn new(entries: IndexMap<Inputs, ValueOrError>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Results with no entries, as delivered for a skipped dependency.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Results holding a single outcome.
    #[must_use]
    pub fn single(inputs: Inputs, outcome: ValueOrError) -> Self {
        let mut entries = IndexMap::with_capacity(1);
        entries.insert(inputs, outcome);
        Self::new(entries)
    }

    /// Returns the outcome of the call made with `inputs`.
    #[must_use]
    pub fn get(&self, inputs: &Inputs) -> Option<&ValueOrError> {
        self.entries.get(inputs)
    }

    /// Iterates over `(inputs, outcome)` pairs in call order.
    pub fn iter(&self) -> impl Iterator<Item = (&Inputs, &ValueOrError)> {
        self.entries.iter()
    }

    /// Iterates over outcomes in call order.
    pub fn values(&self) -> impl Iterator<Item = &ValueOrError> {
        self.entries.values()
    }

    /// Number of calls recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no calls were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Results {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries) || *self.entries == *other.entries
    }
}

impl Eq for Results {}

impl Hash for Results {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.entries.len());
        state.write_u64(unordered_hash(self.entries.iter()));
    }
}

impl fmt::Debug for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl FromIterator<(Inputs, ValueOrError)> for Results {
    fn from_iter<I: IntoIterator<Item = (Inputs, ValueOrError)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Combines per-entry hashes with a commutative sum, so the result does not
/// depend on iteration order.
fn unordered_hash<'a, K, V>(entries: impl Iterator<Item = (&'a K, &'a V)>) -> u64
where
    K: Hash + 'a,
    V: Hash + 'a,
{
    entries.fold(0_u64, |acc, (key, value)| {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        value.hash(&mut hasher);
        acc.wrapping_add(hasher.finish())
    })
}
