//! Posture image dataset for `PostureNetV2` training and evaluation.
//!
//! The dataset lives under `<root>/<base><suffix>/{train,val}/<class>/<image>`,
//! where the suffix selects a pre-resized copy ([`ImageSizeVariant`]).
//! Class directories are labeled in sorted order.
//!
//! # Loading
//!
//! - [`PostureDataset::open`] - scan both splits against one [`LabelMap`]
//! - [`TrainingEpochs`] - seeded shuffles, full batches only
//! - [`sequential_batches`] - validation order, short tail kept
//! - [`collate`] - stack decoded images into `[N, 3, S, S]` tensors
//!
//! # Example
//!
//! ```no_run
//! use burn_ndarray::NdArray;
//! use ml_dataset::{PostureDataset, PostureDatasetConfig, Split};
//!
//! let dataset = PostureDataset::open(PostureDatasetConfig::new("/data").with_batch_size(8))?;
//! let device = Default::default();
//! for indices in dataset.validation_batches()? {
//!     let batch = dataset.load_batch::<NdArray<f32>>(Split::Val, &indices, &device)?;
//!     assert_eq!(batch.images.dims()[1], 3);
//! }
//! # Ok::<(), ml_dataset::DatasetError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod batch;
mod dataset;
mod error;
mod sample;
mod splits;
mod summary;

pub use batch::{SampleBatch, TrainingEpochs, collate, sequential_batches};
pub use dataset::{PostureDataset, PostureDatasetConfig, load_single};
pub use error::{DatasetError, Result};
pub use sample::{LoadedSample, Normalization, PostureSample, load_image};
pub use splits::{DEFAULT_BASE_NAME, ImageSizeVariant, LabelMap, Split, scan_split};
pub use summary::SplitSummary;

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        DatasetError, ImageSizeVariant, LabelMap, Normalization, PostureDataset, PostureDatasetConfig,
        PostureSample, SampleBatch, Split, SplitSummary, TrainingEpochs,
    };
}
