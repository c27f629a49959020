//! Structured outcomes of a load traversal.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::TensorLoadError;

/// How a found tensor is checked against its target before assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ShapePolicy {
    /// The stored shape must equal the target shape exactly.
    #[default]
    Strict,

    /// Only the rank must agree. Used for running statistics, whose first
    /// present key wins.
    Relaxed,
}

impl ShapePolicy {
    /// Returns `true` if a stored tensor of shape `found` may replace a
    /// target of shape `expected`.
    #[must_use]
    pub fn accepts(&self, expected: &[usize], found: &[usize]) -> bool {
        match self {
            Self::Strict => expected == found,
            Self::Relaxed => expected.len() == found.len(),
        }
    }
}

/// What happened to one target tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// The tensor was overwritten from the store.
    Loaded,

    /// The key was absent and the dialect treats that as a silent skip.
    Absent,

    /// The tensor was left untouched because of a per-tensor failure.
    Failed(TensorLoadError),
}

/// Outcome for a single target tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorOutcome {
    /// Key that was read, or the first candidate probed if none was found.
    pub key: String,

    /// Result of the transfer.
    pub status: LoadStatus,
}

/// Per-tensor outcomes of one load traversal, in traversal order.
///
/// A report with failures still describes a usable model: every tensor not
/// listed as loaded simply keeps its prior value.
///
/// # Example
///
/// ```
/// use ml_checkpoint::{LoadReport, LoadStatus};
///
/// let mut report = LoadReport::new();
/// report.record_loaded("model/inputConv/w");
/// assert_eq!(report.loaded_count(), 1);
/// assert!(report.is_complete());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    outcomes: Vec<TensorOutcome>,
}

impl LoadReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful transfer.
    pub fn record_loaded(&mut self, key: impl Into<String>) {
        let key = key.into();
        debug!(%key, "loaded tensor");
        self.outcomes.push(TensorOutcome {
            key,
            status: LoadStatus::Loaded,
        });
    }

    /// Records a silently skipped key.
    pub fn record_absent(&mut self, key: impl Into<String>) {
        let key = key.into();
        debug!(%key, "tensor absent from store, skipping");
        self.outcomes.push(TensorOutcome {
            key,
            status: LoadStatus::Absent,
        });
    }

    /// Records a per-tensor failure.
    pub fn record_failure(&mut self, key: impl Into<String>, error: TensorLoadError) {
        let key = key.into();
        warn!(%key, %error, "tensor not loaded");
        self.outcomes.push(TensorOutcome {
            key,
            status: LoadStatus::Failed(error),
        });
    }

    /// All outcomes in traversal order.
    #[must_use]
    pub fn outcomes(&self) -> &[TensorOutcome] {
        &self.outcomes
    }

    /// Number of tensors visited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns `true` if nothing was visited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of tensors overwritten.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.count(|status| matches!(status, LoadStatus::Loaded))
    }

    /// Number of silently skipped keys.
    #[must_use]
    pub fn absent_count(&self) -> usize {
        self.count(|status| matches!(status, LoadStatus::Absent))
    }

    /// Number of per-tensor failures.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.count(|status| matches!(status, LoadStatus::Failed(_)))
    }

    /// Iterates the per-tensor failures.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &TensorLoadError)> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.status {
            LoadStatus::Failed(error) => Some((outcome.key.as_str(), error)),
            _ => None,
        })
    }

    /// Keys that were found with the wrong shape.
    #[must_use]
    pub fn shape_mismatches(&self) -> Vec<&str> {
        self.failures()
            .filter(|(_, error)| matches!(error, TensorLoadError::ShapeMismatch { .. }))
            .map(|(key, _)| key)
            .collect()
    }

    /// First candidate keys for tensors with no key found.
    #[must_use]
    pub fn missing_keys(&self) -> Vec<&str> {
        self.failures()
            .filter(|(_, error)| matches!(error, TensorLoadError::KeyNotFound { .. }))
            .map(|(key, _)| key)
            .collect()
    }

    /// Returns `true` if every visited tensor was loaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.loaded_count() == self.len()
    }

    fn count(&self, predicate: impl Fn(&LoadStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.status)).count()
    }
}

/// Result of reading a foreign checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForeignLoadReport {
    /// Per-tensor outcomes, backbone first, then classifier.
    pub report: LoadReport,

    /// Layers advanced by the backbone counter.
    pub backbone_layers: usize,

    /// Final value of the top-level counter.
    pub classifier_layers: usize,

    /// `backbone_layers + classifier_layers - 2`, saturating at zero.
    ///
    /// Informational only. The correction term is a calibration against one
    /// family of saved models, not a derived quantity.
    pub reported_layers: usize,
}

impl ForeignLoadReport {
    /// Combines a traversal's outcomes with its two counter values.
    #[must_use]
    pub fn new(report: LoadReport, backbone_layers: usize, classifier_layers: usize) -> Self {
        Self {
            report,
            backbone_layers,
            classifier_layers,
            reported_layers: (backbone_layers + classifier_layers).saturating_sub(2),
        }
    }
}
