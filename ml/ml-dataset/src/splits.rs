//! Dataset directory layout: splits, size variants and class labels.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DatasetError, Result};
use crate::sample::PostureSample;

/// Default base name of the dataset directory.
pub const DEFAULT_BASE_NAME: &str = "imageposture";

/// A dataset split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    /// Training images, shuffled every epoch.
    Train,

    /// Validation images, read in order.
    Val,
}

impl Split {
    /// Directory name of the split.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Which pre-resized copy of the images to read.
///
/// # Example
///
/// ```
/// use ml_dataset::ImageSizeVariant;
///
/// assert_eq!(ImageSizeVariant::Resized320.directory_name("imageposture"), "imageposture-320");
/// assert_eq!(ImageSizeVariant::Full.directory_name("imageposture"), "imageposture");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ImageSizeVariant {
    /// Original images.
    Full,

    /// Images resized to 150 pixels on the short side.
    Resized150,

    /// Images resized to 320 pixels on the short side.
    #[default]
    Resized320,
}

impl ImageSizeVariant {
    /// Suffix appended to the base directory name.
    #[must_use]
    pub const fn suffix(&self) -> &'static str {
        match self {
            Self::Full => "",
            Self::Resized150 => "-150",
            Self::Resized320 => "-320",
        }
    }

    /// Returns the variant name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Resized150 => "resized150",
            Self::Resized320 => "resized320",
        }
    }

    /// Parses a variant name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "full" => Some(Self::Full),
            "resized150" | "150" => Some(Self::Resized150),
            "resized320" | "320" => Some(Self::Resized320),
            _ => None,
        }
    }

    /// Dataset directory name for `base`.
    #[must_use]
    pub fn directory_name(&self, base: &str) -> String {
        format!("{base}{}", self.suffix())
    }
}

impl std::fmt::Display for ImageSizeVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Class names in label order.
///
/// Labels are assigned by sorting the distinct class names, so label `i`
/// is the `i`-th name in lexicographic order.
///
/// # Example
///
/// ```
/// use ml_dataset::LabelMap;
///
/// let labels = LabelMap::from_classes(["upright", "slouch", "upright"]);
/// assert_eq!(labels.len(), 2);
/// assert_eq!(labels.label_of("slouch"), Some(0));
/// assert_eq!(labels.class_name(1), Some("upright"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap {
    classes: Vec<String>,
}

impl LabelMap {
    /// Builds a label map from class names, ignoring duplicates.
    #[must_use]
    pub fn from_classes<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut classes: Vec<String> = classes.into_iter().map(Into::into).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    /// Label of a class name.
    #[must_use]
    pub fn label_of(&self, class: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(class)).ok()
    }

    /// Class name of a label.
    #[must_use]
    pub fn class_name(&self, label: usize) -> Option<&str> {
        self.classes.get(label).map(String::as_str)
    }

    /// Class names in label order.
    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if there are no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// Lists visible entries of `dir` in sorted order.
fn visible_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !is_hidden(&path) {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

/// Scans one split directory of per-class subdirectories.
///
/// With `labels` absent the label map is built from this split's class
/// directories. With `labels` given every class directory must already be
/// in it. Hidden entries are skipped at both levels.
///
/// # Errors
///
/// Returns `DatasetError::MissingSplit` if `split_dir` is not a directory,
/// `DatasetError::UnknownClass` for a class missing from `labels` and
/// `DatasetError::EmptyDataset` if no images are found.
pub fn scan_split(split_dir: &Path, split: Split, labels: Option<&LabelMap>) -> Result<(LabelMap, Vec<PostureSample>)> {
    if !split_dir.is_dir() {
        return Err(DatasetError::missing_split(split_dir.display().to_string()));
    }

    let class_dirs: Vec<PathBuf> = visible_entries(split_dir)?
        .into_iter()
        .filter(|path| path.is_dir())
        .collect();
    let class_name = |dir: &Path| dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

    let labels = match labels {
        Some(labels) => labels.clone(),
        None => LabelMap::from_classes(class_dirs.iter().map(|dir| class_name(dir))),
    };

    let mut samples = Vec::new();
    for dir in &class_dirs {
        let class = class_name(dir);
        let label = labels
            .label_of(&class)
            .ok_or_else(|| DatasetError::unknown_class(&class, split.name()))?;
        let files = visible_entries(dir)?.into_iter().filter(|path| path.is_file());
        let before = samples.len();
        samples.extend(files.map(|path| PostureSample::new(path, label)));
        debug!(split = %split, class = %class, label, images = samples.len() - before, "Scanned class directory");
    }

    if samples.is_empty() {
        return Err(DatasetError::empty_dataset(split.name()));
    }
    Ok((labels, samples))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(path, b"");
    }

    #[test]
    fn size_variant_suffixes() {
        assert_eq!(ImageSizeVariant::Full.suffix(), "");
        assert_eq!(ImageSizeVariant::Resized150.suffix(), "-150");
        assert_eq!(ImageSizeVariant::Resized320.suffix(), "-320");
        assert_eq!(ImageSizeVariant::default(), ImageSizeVariant::Resized320);
    }

    #[test]
    fn size_variant_from_name() {
        assert_eq!(ImageSizeVariant::from_name("FULL"), Some(ImageSizeVariant::Full));
        assert_eq!(ImageSizeVariant::from_name("150"), Some(ImageSizeVariant::Resized150));
        assert_eq!(ImageSizeVariant::from_name("640"), None);
    }

    #[test]
    fn label_map_sorted() {
        let labels = LabelMap::from_classes(["zeta", "alpha", "mid"]);
        assert_eq!(labels.classes(), &["alpha", "mid", "zeta"]);
        assert_eq!(labels.label_of("zeta"), Some(2));
        assert_eq!(labels.label_of("missing"), None);
        assert_eq!(labels.class_name(3), None);
    }

    #[test]
    fn scan_skips_hidden_entries() {
        let dir = tempdir().unwrap();
        let train = dir.path().join("train");
        touch(&train.join("upright/a.jpg"));
        touch(&train.join("upright/.DS_Store"));
        touch(&train.join("slouch/b.jpg"));
        touch(&train.join("slouch/c.jpg"));
        touch(&train.join(".hidden/d.jpg"));

        let (labels, samples) = scan_split(&train, Split::Train, None).unwrap();
        assert_eq!(labels.classes(), &["slouch", "upright"]);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples.iter().filter(|s| s.label == 0).count(), 2);
    }

    #[test]
    fn scan_with_unknown_class_fails() {
        let dir = tempdir().unwrap();
        let val = dir.path().join("val");
        touch(&val.join("lying/a.jpg"));
        let labels = LabelMap::from_classes(["slouch", "upright"]);

        let result = scan_split(&val, Split::Val, Some(&labels));
        assert!(matches!(result, Err(DatasetError::UnknownClass { .. })));
    }

    #[test]
    fn scan_missing_and_empty_splits() {
        let dir = tempdir().unwrap();
        let missing = scan_split(&dir.path().join("val"), Split::Val, None);
        assert!(matches!(missing, Err(DatasetError::MissingSplit(_))));

        let _ = std::fs::create_dir_all(dir.path().join("train/upright"));
        let empty = scan_split(&dir.path().join("train"), Split::Train, None);
        assert!(matches!(empty, Err(DatasetError::EmptyDataset(_))));
    }
}
