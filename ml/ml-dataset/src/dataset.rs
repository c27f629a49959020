//! The posture dataset: both splits of one size variant.

use std::path::{Path, PathBuf};

use burn::prelude::Backend;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::batch::{SampleBatch, TrainingEpochs, collate, sequential_batches};
use crate::error::{DatasetError, Result};
use crate::sample::{Normalization, PostureSample};
use crate::splits::{DEFAULT_BASE_NAME, ImageSizeVariant, LabelMap, Split, scan_split};
use crate::summary::SplitSummary;

/// Configuration for [`PostureDataset`].
///
/// # Example
///
/// ```
/// use ml_dataset::PostureDatasetConfig;
///
/// let config = PostureDatasetConfig::new("/data").with_batch_size(16);
/// assert_eq!(config.output_size, 224);
/// assert!(config.dataset_dir().ends_with("imageposture-320"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureDatasetConfig {
    /// Directory holding the dataset directories.
    pub root: PathBuf,

    /// Base name of the dataset directory.
    pub base_name: String,

    /// Which resized copy to read.
    pub size_variant: ImageSizeVariant,

    /// Side length of the square images produced.
    pub output_size: u32,

    /// Images per batch.
    pub batch_size: usize,

    /// Normalization applied after scaling to `[0, 1]`.
    pub normalization: Option<Normalization>,

    /// Seed of the training shuffle.
    pub seed: u64,
}

impl PostureDatasetConfig {
    /// Creates a configuration with defaults under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base_name: DEFAULT_BASE_NAME.to_string(),
            size_variant: ImageSizeVariant::default(),
            output_size: 224,
            batch_size: 32,
            normalization: Some(Normalization::imagenet()),
            seed: 42,
        }
    }

    /// Sets the size variant.
    #[must_use]
    pub const fn with_size_variant(mut self, size_variant: ImageSizeVariant) -> Self {
        self.size_variant = size_variant;
        self
    }

    /// Sets the output image size.
    #[must_use]
    pub const fn with_output_size(mut self, output_size: u32) -> Self {
        self.output_size = output_size;
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets or clears normalization.
    #[must_use]
    pub const fn with_normalization(mut self, normalization: Option<Normalization>) -> Self {
        self.normalization = normalization;
        self
    }

    /// Sets the shuffle seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Directory holding the `train` and `val` splits.
    #[must_use]
    pub fn dataset_dir(&self) -> PathBuf {
        self.root.join(self.size_variant.directory_name(&self.base_name))
    }

    /// Directory of one split.
    #[must_use]
    pub fn split_dir(&self, split: Split) -> PathBuf {
        self.dataset_dir().join(split.name())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::InvalidBatchSize` for a zero batch size and
    /// `DatasetError::InvalidConfig` for a zero output size or a
    /// non-positive standard deviation.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DatasetError::InvalidBatchSize(self.batch_size));
        }
        if self.output_size == 0 {
            return Err(DatasetError::invalid_config("output_size must be > 0"));
        }
        if self.normalization.is_some_and(|n| !n.is_valid()) {
            return Err(DatasetError::invalid_config("normalization std must be positive"));
        }
        Ok(())
    }
}

/// Training and validation samples of the posture dataset.
///
/// Labels come from the training split's class directories; the validation
/// split is read against the same label map.
#[derive(Debug, Clone)]
pub struct PostureDataset {
    config: PostureDatasetConfig,
    labels: LabelMap,
    training: Vec<PostureSample>,
    validation: Vec<PostureSample>,
}

impl PostureDataset {
    /// Scans both splits.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a split is
    /// missing, empty or has a class the training split lacks.
    pub fn open(config: PostureDatasetConfig) -> Result<Self> {
        config.validate()?;
        let (labels, training) = scan_split(&config.split_dir(Split::Train), Split::Train, None)?;
        let (_, validation) = scan_split(&config.split_dir(Split::Val), Split::Val, Some(&labels))?;
        info!(
            dir = %config.dataset_dir().display(),
            classes = labels.len(),
            training = training.len(),
            validation = validation.len(),
            "Opened posture dataset"
        );
        Ok(Self {
            config,
            labels,
            training,
            validation,
        })
    }

    /// Configuration the dataset was opened with.
    #[must_use]
    pub const fn config(&self) -> &PostureDatasetConfig {
        &self.config
    }

    /// Label map shared by both splits.
    #[must_use]
    pub const fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Samples of a split.
    #[must_use]
    pub fn samples(&self, split: Split) -> &[PostureSample] {
        match split {
            Split::Train => &self.training,
            Split::Val => &self.validation,
        }
    }

    /// Shuffled training epochs of sample indices.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::InvalidBatchSize` for a zero batch size.
    pub fn training_epochs(&self) -> Result<TrainingEpochs> {
        TrainingEpochs::new(self.training.len(), self.config.batch_size, self.config.seed)
    }

    /// Validation batches of sample indices, in order.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::InvalidBatchSize` for a zero batch size.
    pub fn validation_batches(&self) -> Result<Vec<Vec<usize>>> {
        sequential_batches(self.validation.len(), self.config.batch_size)
    }

    /// Decodes and collates the samples at `indices` of `split`.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::ImageDecode` for an unreadable image and
    /// `DatasetError::InvalidConfig` for an index out of range.
    pub fn load_batch<B: Backend>(&self, split: Split, indices: &[usize], device: &B::Device) -> Result<SampleBatch<B>> {
        let samples = self.samples(split);
        let normalization = self.config.normalization.as_ref();
        let loaded = indices
            .iter()
            .map(|&index| {
                samples
                    .get(index)
                    .ok_or_else(|| DatasetError::invalid_config(format!("{split} has no sample {index}")))?
                    .load(self.config.output_size, normalization)
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(split = %split, images = loaded.len(), "Loaded batch");
        collate(&loaded, self.config.output_size as usize, device)
    }

    /// Class counts of a split.
    #[must_use]
    pub fn summary(&self, split: Split) -> SplitSummary {
        SplitSummary::from_samples(split, self.samples(split), &self.labels)
    }
}

/// Loads one image file as a single-image batch, for inference.
///
/// # Errors
///
/// Returns `DatasetError::ImageDecode` if the image cannot be decoded.
pub fn load_single<B: Backend>(
    path: &Path,
    output_size: u32,
    normalization: Option<&Normalization>,
    device: &B::Device,
) -> Result<SampleBatch<B>> {
    let loaded = PostureSample::new(path, 0).load(output_size, normalization)?;
    collate(&[loaded], output_size as usize, device)
}
