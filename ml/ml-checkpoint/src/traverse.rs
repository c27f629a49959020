//! Traversal protocol implemented by every model node.
//!
//! Each trait visits a node's children in declaration order. Layers move
//! their own tensors; composites delegate, extending the scope for the
//! native dialect or threading the shared counter for the foreign one.

use crate::counter::LayerCounter;
use crate::report::LoadReport;
use crate::scope::ScopePath;
use crate::store::TensorStore;
use crate::summary::Summary;

/// Writes a node's tensors under native keys.
pub trait NativeExport {
    /// Exports every tensor below `scope` into `store`.
    fn export_native(&self, scope: &ScopePath, store: &mut TensorStore);
}

/// Reads a node's tensors from native keys.
pub trait NativeImport {
    /// Imports every tensor below `scope`, recording each outcome.
    fn import_native(&mut self, scope: &ScopePath, store: &TensorStore, report: &mut LoadReport);
}

/// Reads a node's tensors from counter-addressed foreign keys.
pub trait ForeignImport {
    /// Imports every tensor, advancing `counter` once per weighted layer.
    fn import_foreign(&mut self, store: &TensorStore, counter: &mut LayerCounter, report: &mut LoadReport);
}

/// Describes a node without moving tensors.
pub trait Summarize {
    /// Appends records for this node and its children.
    fn summarize(&self, scope: &ScopePath, summary: &mut Summary);
}

impl<T: NativeExport> NativeExport for Option<T> {
    fn export_native(&self, scope: &ScopePath, store: &mut TensorStore) {
        if let Some(node) = self {
            node.export_native(scope, store);
        }
    }
}

impl<T: NativeImport> NativeImport for Option<T> {
    fn import_native(&mut self, scope: &ScopePath, store: &TensorStore, report: &mut LoadReport) {
        if let Some(node) = self {
            node.import_native(scope, store, report);
        }
    }
}

impl<T: ForeignImport> ForeignImport for Option<T> {
    fn import_foreign(&mut self, store: &TensorStore, counter: &mut LayerCounter, report: &mut LoadReport) {
        if let Some(node) = self {
            node.import_foreign(store, counter, report);
        }
    }
}

impl<T: Summarize> Summarize for Option<T> {
    fn summarize(&self, scope: &ScopePath, summary: &mut Summary) {
        if let Some(node) = self {
            node.summarize(scope, summary);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::store::StoredTensor;

    struct Leaf(f32);

    impl NativeExport for Leaf {
        fn export_native(&self, scope: &ScopePath, store: &mut TensorStore) {
            store.insert(scope.param("w"), StoredTensor::filled(vec![1], self.0));
        }
    }

    impl ForeignImport for Leaf {
        fn import_foreign(&mut self, store: &TensorStore, counter: &mut LayerCounter, _: &mut LoadReport) {
            if let Some(t) = store.get(&counter.key("kernel")) {
                self.0 = t.values[0];
            }
            counter.advance();
        }
    }

    #[test]
    fn absent_optional_node_is_skipped() {
        let node: Option<Leaf> = None;
        let mut store = TensorStore::new();
        node.export_native(&ScopePath::root("model"), &mut store);
        assert!(store.is_empty());

        let mut node: Option<Leaf> = None;
        let mut counter = LayerCounter::new();
        node.import_foreign(&store, &mut counter, &mut LoadReport::new());
        assert_eq!(counter.current(), 0);
    }

    #[test]
    fn present_optional_node_delegates() {
        let node = Some(Leaf(2.0));
        let mut store = TensorStore::new();
        node.export_native(&ScopePath::root("model").child("conv1"), &mut store);
        assert!(store.contains("model/conv1/w"));

        let mut node = Some(Leaf(0.0));
        let mut counter = LayerCounter::new();
        let mut foreign = TensorStore::new();
        foreign.insert(counter.key("kernel"), StoredTensor::filled(vec![1], 9.0));
        node.import_foreign(&foreign, &mut counter, &mut LoadReport::new());
        assert_eq!(counter.current(), 1);
        assert!(matches!(node, Some(Leaf(v)) if (v - 9.0).abs() < f32::EPSILON));
    }
}
