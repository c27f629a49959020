//! Per-split class statistics.

use serde::{Deserialize, Serialize};

use crate::sample::PostureSample;
use crate::splits::{LabelMap, Split};

/// Class counts for one split.
///
/// # Example
///
/// ```
/// use ml_dataset::{LabelMap, PostureSample, Split, SplitSummary};
///
/// let labels = LabelMap::from_classes(["slouch", "upright"]);
/// let samples = vec![
///     PostureSample::new("a.jpg", 0),
///     PostureSample::new("b.jpg", 1),
///     PostureSample::new("c.jpg", 1),
/// ];
///
/// let summary = SplitSummary::from_samples(Split::Train, &samples, &labels);
/// assert_eq!(summary.total_samples, 3);
/// assert_eq!(summary.count_of("upright"), Some(2));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitSummary {
    /// Split summarized.
    pub split: Split,

    /// Total number of samples.
    pub total_samples: usize,

    /// `(class name, count)` in label order, including empty classes.
    pub class_counts: Vec<(String, usize)>,
}

impl SplitSummary {
    /// Counts samples per label.
    #[must_use]
    pub fn from_samples(split: Split, samples: &[PostureSample], labels: &LabelMap) -> Self {
        let mut counts = vec![0usize; labels.len()];
        for sample in samples {
            if let Some(count) = counts.get_mut(sample.label) {
                *count += 1;
            }
        }
        Self {
            split,
            total_samples: samples.len(),
            class_counts: labels.classes().iter().cloned().zip(counts).collect(),
        }
    }

    /// Count for a class name.
    #[must_use]
    pub fn count_of(&self, class: &str) -> Option<usize> {
        self.class_counts
            .iter()
            .find(|(name, _)| name == class)
            .map(|(_, count)| *count)
    }

    /// Returns true if the split is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    /// Fraction of samples in the largest class.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn majority_fraction(&self) -> f32 {
        if self.total_samples == 0 {
            return 0.0;
        }
        let largest = self.class_counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
        largest as f32 / self.total_samples as f32
    }

    /// Returns a human-readable summary string.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_report(&self) -> String {
        use std::fmt::Write;

        let mut report = String::new();
        let _ = writeln!(report, "Split: {}", self.split);
        let _ = writeln!(report, "Total samples: {}", self.total_samples);
        for (class, count) in &self.class_counts {
            let percent = if self.total_samples == 0 {
                0.0
            } else {
                *count as f32 / self.total_samples as f32 * 100.0
            };
            let _ = writeln!(report, "  {class}: {count} ({percent:.1}%)");
        }
        report
    }
}
