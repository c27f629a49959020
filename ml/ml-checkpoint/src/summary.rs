//! Diagnostic records produced by a summary traversal.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// One line of a model summary.
///
/// Composite nodes appear as header records with no shapes; layers list one
/// shape per owned tensor in traversal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// Node type name, e.g. `Conv2D` or `InvertedBottleneckBlock`.
    pub kind: String,

    /// Scope path of the node.
    pub scope: String,

    /// Shapes of the owned tensors.
    pub shapes: Vec<Vec<usize>>,

    /// Nesting depth below the root.
    pub depth: usize,
}

impl SummaryRecord {
    /// Number of scalar parameters owned directly by this node.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.shapes.iter().map(|s| s.iter().product::<usize>()).sum()
    }
}

/// Ordered summary of a model tree.
///
/// # Example
///
/// ```
/// use ml_checkpoint::Summary;
///
/// let mut summary = Summary::new();
/// summary.layer("Dense", "model/outputClassifier", vec![vec![4, 2], vec![2]]);
/// assert_eq!(summary.total_parameters(), 10);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    records: Vec<SummaryRecord>,
    depth: usize,
}

impl Summary {
    /// Creates an empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a layer with its tensor shapes.
    pub fn layer(&mut self, kind: &str, scope: &str, shapes: Vec<Vec<usize>>) {
        self.records.push(SummaryRecord {
            kind: kind.to_string(),
            scope: scope.to_string(),
            shapes,
            depth: self.depth,
        });
    }

    /// Records a node without tensors (padding, pooling, activations).
    pub fn marker(&mut self, kind: &str, scope: &str) {
        self.layer(kind, scope, Vec::new());
    }

    /// Records a composite header and nests the records written by `body`.
    pub fn nested(&mut self, kind: &str, scope: &str, body: impl FnOnce(&mut Self)) {
        self.marker(kind, scope);
        self.depth += 1;
        body(self);
        self.depth -= 1;
    }

    /// All records in traversal order.
    #[must_use]
    pub fn records(&self) -> &[SummaryRecord] {
        &self.records
    }

    /// Records that own tensors.
    pub fn layers(&self) -> impl Iterator<Item = &SummaryRecord> {
        self.records.iter().filter(|r| !r.shapes.is_empty())
    }

    /// Sum of all tensor element counts.
    #[must_use]
    pub fn total_parameters(&self) -> usize {
        self.records.iter().map(SummaryRecord::parameter_count).sum()
    }

    /// Renders a fixed-width table.
    #[must_use]
    pub fn render_table(&self) -> String {
        let rule = "_".repeat(104);
        let mut out = String::new();
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "{:<34} {:<36} {:>10}   Scope", "Layer (type)", "Shapes", "Param #");
        let _ = writeln!(out, "{}", "=".repeat(104));
        for record in &self.records {
            let kind = format!("{}{}", "  ".repeat(record.depth), record.kind);
            let shapes = record
                .shapes
                .iter()
                .map(|s| format!("{s:?}"))
                .collect::<Vec<_>>()
                .join(" ");
            let params = if record.shapes.is_empty() {
                String::new()
            } else {
                record.parameter_count().to_string()
            };
            let _ = writeln!(out, "{kind:<34} {shapes:<36} {params:>10}   {}", record.scope);
        }
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Total params: {}", self.total_parameters());
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn nested_records_depth() {
        let mut summary = Summary::new();
        summary.nested("Block", "model/block_1", |s| {
            s.layer("Conv2D", "model/block_1/conv1", vec![vec![8, 4, 1, 1], vec![8]]);
            s.marker("ReLU", "model/block_1/conv1ReLU");
        });
        summary.marker("GlobalAvgPool2D", "model/avgPool");

        let depths: Vec<usize> = summary.records().iter().map(|r| r.depth).collect();
        assert_eq!(depths, vec![0, 1, 1, 0]);
        assert_eq!(summary.layers().count(), 1);
        assert_eq!(summary.total_parameters(), 40);
    }

    #[test]
    fn table_lists_every_scope() {
        let mut summary = Summary::new();
        summary.layer("BatchNorm", "model/inputConvBN", vec![vec![32]; 4]);
        summary.marker("ZeroPadding2D", "model/inputPad");

        let table = summary.render_table();
        assert!(table.contains("model/inputConvBN"));
        assert!(table.contains("model/inputPad"));
        assert!(table.contains("128"));
        assert!(table.contains("Total params: 128"));
    }

    #[test]
    fn summary_serializes() {
        let mut summary = Summary::new();
        summary.layer("Dense", "d", vec![vec![2, 2]]);
        let json = serde_json::to_string(&summary).unwrap_or_default();
        let parsed: Result<Summary, _> = serde_json::from_str(&json);
        assert_eq!(parsed.ok(), Some(summary));
    }
}
