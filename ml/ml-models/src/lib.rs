//! `MobileNetV2`-family image classifiers built with Burn.
//!
//! Every node of a model tree takes part in four traversals defined in
//! [`ml_checkpoint`]: native export, native import, foreign import and
//! summary. The models here compose those traversals from a handful of
//! layer wrappers and block types.
//!
//! # Architectures
//!
//! - [`MobileNetV2`] - the reference network, 1000 classes by default
//! - [`PostureNetV2`] - the same backbone with a dropout head for posture
//!   classification, 2 classes by default
//!
//! # Checkpoints
//!
//! - [`write_checkpoint`] / [`read_checkpoint`] use the native dialect,
//!   keyed by scope path under [`ROOT_SCOPE`]
//! - [`read_foreign_checkpoint`] reads the layer-numbered dialect of
//!   checkpoints produced by the Python training stack
//!
//! # Example
//!
//! ```no_run
//! use burn_ndarray::NdArray;
//! use ml_models::{PostureNetV2, PostureNetV2Config, summarize};
//!
//! let device = Default::default();
//! let model = PostureNetV2::<NdArray<f32>>::new(&PostureNetV2Config::default(), &device)?;
//! println!("{}", summarize(&model).render_table());
//! # Ok::<(), ml_models::ModelError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod blocks;
mod channels;
mod checkpoint;
mod error;
mod layers;
mod mobilenet_v2;
mod posture_net_v2;

pub use blocks::{
    BlockConfig, DEFAULT_EXPANSION, InitialInvertedBottleneckBlock, InvertedBottleneckBlock,
    InvertedBottleneckBlockStack, InvertedResidualBlock, has_residual,
};
pub use channels::{DEFAULT_DIVISOR, make_divisible, round_filter_pair};
pub use checkpoint::{
    Architecture, ImageClassifier, NATIVE_DIALECT, ROOT_SCOPE, export_store, import_foreign_store, import_store,
    read_checkpoint, read_foreign_checkpoint, summarize, write_checkpoint,
};
pub use error::{ModelError, Result};
pub use layers::{Conv, Dense, DepthwiseConv, Norm, NormConfig, pad_bottom_right, relu6};
pub use mobilenet_v2::{MobileNetV2, MobileNetV2Config, last_block_filters};
pub use posture_net_v2::{PostureNetV2, PostureNetV2Config};

pub use ml_checkpoint::CheckpointFormat;

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        Architecture, CheckpointFormat, ImageClassifier, MobileNetV2, MobileNetV2Config, ModelError, PostureNetV2,
        PostureNetV2Config, read_checkpoint, read_foreign_checkpoint, summarize, write_checkpoint,
    };
}
