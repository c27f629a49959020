//! In-memory named-tensor store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CheckpointError, Result};

/// A dense `f32` tensor detached from any backend.
///
/// Values are stored row-major in the order implied by `shape`.
///
/// # Example
///
/// ```
/// use ml_checkpoint::StoredTensor;
///
/// let tensor = StoredTensor::new(vec![2, 3], vec![0.0; 6]);
/// assert_eq!(tensor.element_count(), 6);
/// assert_eq!(tensor.rank(), 2);
/// assert!(tensor.is_consistent());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTensor {
    /// Tensor dimensions.
    pub shape: Vec<usize>,

    /// Row-major values.
    pub values: Vec<f32>,
}

impl StoredTensor {
    /// Creates a tensor from a shape and its values.
    #[must_use]
    pub const fn new(shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self { shape, values }
    }

    /// Creates a tensor filled with `value`.
    #[must_use]
    pub fn filled(shape: Vec<usize>, value: f32) -> Self {
        let count = shape.iter().product();
        Self {
            shape,
            values: vec![value; count],
        }
    }

    /// Number of elements implied by the shape.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Returns `true` if the value count matches the shape.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.values.len() == self.element_count()
    }

    /// Checks consistency, naming `key` in the error.
    ///
    /// # Errors
    ///
    /// Returns `CheckpointError::InvalidTensor` if the value count disagrees with the shape.
    pub fn validate(&self, key: &str) -> Result<()> {
        if self.is_consistent() {
            Ok(())
        } else {
            Err(CheckpointError::InvalidTensor {
                key: key.to_string(),
                shape: self.shape.clone(),
                expected: self.element_count(),
                actual: self.values.len(),
            })
        }
    }
}

/// Mapping from hierarchical string key to tensor, plus string metadata.
///
/// The store is the serialization target of a save traversal and the
/// source of a load traversal. Keys are unique; a second insert under the
/// same key replaces the first and hands it back to the caller.
///
/// # Example
///
/// ```
/// use ml_checkpoint::{StoredTensor, TensorStore};
///
/// let mut store = TensorStore::new();
/// store.insert("model/inputConv/w", StoredTensor::filled(vec![4], 1.0));
///
/// assert!(store.contains("model/inputConv/w"));
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TensorStore {
    tensors: BTreeMap<String, StoredTensor>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
}

impl TensorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a tensor, returning the tensor previously stored under `key`.
    pub fn insert(&mut self, key: impl Into<String>, tensor: StoredTensor) -> Option<StoredTensor> {
        self.tensors.insert(key.into(), tensor)
    }

    /// Returns the tensor stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&StoredTensor> {
        self.tensors.get(key)
    }

    /// Removes and returns the tensor stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<StoredTensor> {
        self.tensors.remove(key)
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.tensors.contains_key(key)
    }

    /// Returns the first candidate key present in the store, with its tensor.
    #[must_use]
    pub fn first_present<'a, S: AsRef<str>>(
        &'a self,
        candidates: &'a [S],
    ) -> Option<(&'a str, &'a StoredTensor)> {
        candidates.iter().find_map(|candidate| {
            let key = candidate.as_ref();
            self.tensors.get(key).map(|tensor| (key, tensor))
        })
    }

    /// Iterates keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// Iterates `(key, tensor)` pairs in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoredTensor)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of tensors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Returns `true` if the store holds no tensors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total number of scalar values across all tensors.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.tensors.values().map(StoredTensor::element_count).sum()
    }

    /// Sets a metadata entry.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Returns a metadata entry.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// All metadata entries.
    #[must_use]
    pub const fn metadata_map(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Validates every tensor.
    ///
    /// # Errors
    ///
    /// Returns the first `CheckpointError::InvalidTensor` found.
    pub fn validate(&self) -> Result<()> {
        self.tensors
            .iter()
            .try_for_each(|(key, tensor)| tensor.validate(key))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn tensor_filled() {
        let tensor = StoredTensor::filled(vec![2, 2], 0.5);
        assert_eq!(tensor.values, vec![0.5; 4]);
        assert!(tensor.is_consistent());
    }

    #[test]
    fn tensor_validate() {
        let bad = StoredTensor::new(vec![3], vec![1.0, 2.0]);
        assert!(!bad.is_consistent());
        let err = bad.validate("a/w");
        assert!(matches!(err, Err(CheckpointError::InvalidTensor { .. })));

        let good = StoredTensor::new(vec![2], vec![1.0, 2.0]);
        assert!(good.validate("a/w").is_ok());
    }

    #[test]
    fn scalar_tensor_has_one_element() {
        let tensor = StoredTensor::new(Vec::new(), vec![3.0]);
        assert_eq!(tensor.element_count(), 1);
        assert_eq!(tensor.rank(), 0);
        assert!(tensor.is_consistent());
    }

    #[test]
    fn store_insert_replaces() {
        let mut store = TensorStore::new();
        assert!(store.insert("a", StoredTensor::filled(vec![1], 1.0)).is_none());
        let previous = store.insert("a", StoredTensor::filled(vec![1], 2.0));
        assert_eq!(previous, Some(StoredTensor::filled(vec![1], 1.0)));
        assert_eq!(store.get("a"), Some(&StoredTensor::filled(vec![1], 2.0)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn store_first_present_follows_candidate_order() {
        let mut store = TensorStore::new();
        store.insert("legacy", StoredTensor::filled(vec![1], 1.0));
        store.insert("current", StoredTensor::filled(vec![1], 2.0));

        let candidates = ["current", "legacy"];
        let found = store
            .first_present(&candidates)
            .map(|(key, tensor)| (key, tensor.values.clone()));
        assert_eq!(found, Some(("current", vec![2.0])));

        let fallback = ["missing", "legacy"];
        assert_eq!(store.first_present(&fallback).map(|(k, _)| k), Some("legacy"));

        let none = ["missing"];
        assert!(store.first_present(&none).is_none());
    }

    #[test]
    fn store_keys_sorted() {
        let mut store = TensorStore::new();
        store.insert("b", StoredTensor::filled(vec![1], 0.0));
        store.insert("a", StoredTensor::filled(vec![1], 0.0));
        let keys: Vec<&str> = store.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn store_parameter_count() {
        let mut store = TensorStore::new();
        store.insert("a", StoredTensor::filled(vec![2, 3], 0.0));
        store.insert("b", StoredTensor::filled(vec![4], 0.0));
        assert_eq!(store.parameter_count(), 10);
    }

    #[test]
    fn store_metadata() {
        let mut store = TensorStore::new();
        store.set_metadata("architecture", "PostureNetV2");
        assert_eq!(store.metadata("architecture"), Some("PostureNetV2"));
        assert_eq!(store.metadata("missing"), None);
    }

    #[test]
    fn store_serialization() {
        let mut store = TensorStore::new();
        store.insert("model/outputClassifier/b", StoredTensor::filled(vec![2], 0.25));
        store.set_metadata("class_count", "2");

        let json = serde_json::to_string(&store).unwrap_or_default();
        let parsed: std::result::Result<TensorStore, _> = serde_json::from_str(&json);
        assert!(parsed.is_ok());
        assert_eq!(parsed.unwrap_or_default(), store);
    }
}
