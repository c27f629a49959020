//! `PostureNetV2`: a `MobileNetV2` backbone with a dropout-regularized
//! dense head, used for binary posture classification.

use burn::module::Module;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig};
use burn::prelude::Backend;
use burn::tensor::Tensor;
use ml_checkpoint::{
    ForeignImport, LayerCounter, LoadReport, NativeExport, NativeImport, ScopePath, Summarize, Summary,
    TensorStore,
};
use serde::{Deserialize, Serialize};

use crate::blocks::{BlockConfig, DEFAULT_EXPANSION, InvertedResidualBlock};
use crate::channels::{DEFAULT_DIVISOR, make_divisible};
use crate::checkpoint::{Architecture, ImageClassifier};
use crate::error::{ModelError, Result};
use crate::layers::{Conv, Dense, Norm, NormConfig, pad_bottom_right, relu6};
use crate::mobilenet_v2::last_block_filters;

/// Nominal `(input, output)` channels and stride of blocks 0 through 16.
const BLOCKS: [((usize, usize), usize); 17] = [
    ((32, 16), 1),
    ((16, 24), 2),
    ((24, 24), 1),
    ((24, 32), 2),
    ((32, 32), 1),
    ((32, 32), 1),
    ((32, 64), 2),
    ((64, 64), 1),
    ((64, 64), 1),
    ((64, 64), 1),
    ((64, 96), 1),
    ((96, 96), 1),
    ((96, 96), 1),
    ((96, 160), 2),
    ((160, 160), 1),
    ((160, 160), 1),
    ((160, 320), 1),
];

/// Configuration for [`PostureNetV2`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostureNetV2Config {
    /// Number of output classes.
    pub class_count: usize,

    /// Width multiplier (alpha).
    pub width_multiplier: f32,

    /// Dropout probability before the classifier.
    pub dropout: f64,

    /// Normalization hyperparameters.
    pub norm: NormConfig,
}

impl Default for PostureNetV2Config {
    fn default() -> Self {
        Self {
            class_count: 2,
            width_multiplier: 1.0,
            dropout: 0.2,
            norm: NormConfig::from_decay(0.999, 0.001),
        }
    }
}

impl PostureNetV2Config {
    /// Sets the number of classes.
    #[must_use]
    pub const fn with_class_count(mut self, class_count: usize) -> Self {
        self.class_count = class_count;
        self
    }

    /// Sets the width multiplier.
    #[must_use]
    pub const fn with_width_multiplier(mut self, width_multiplier: f32) -> Self {
        self.width_multiplier = width_multiplier;
        self
    }

    /// Sets the dropout probability.
    #[must_use]
    pub const fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Returns `true` if all hyperparameters are in range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.class_count > 0
            && self.width_multiplier.is_finite()
            && self.width_multiplier > 0.0
            && (0.0..1.0).contains(&self.dropout)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.class_count == 0 {
            return Err(ModelError::invalid_config("class_count must be > 0"));
        }
        if !(self.width_multiplier.is_finite() && self.width_multiplier > 0.0) {
            return Err(ModelError::invalid_config(format!(
                "width_multiplier must be positive, got {}",
                self.width_multiplier
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::invalid_config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

/// `PostureNetV2` classifier over `[N, 3, H, W]` images.
#[derive(Module, Debug)]
pub struct PostureNetV2<B: Backend> {
    input_conv: Conv<B>,
    input_conv_bn: Norm<B>,
    blocks: Vec<InvertedResidualBlock<B>>,
    output_conv: Conv<B>,
    output_conv_bn: Norm<B>,
    avg_pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    output_classifier: Dense<B>,
    class_count: usize,
    width_multiplier: f32,
}

impl<B: Backend> PostureNetV2<B> {
    /// Builds the network.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: &PostureNetV2Config, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let width = config.width_multiplier;
        let norm = config.norm;
        let input_filters = make_divisible(32, width, DEFAULT_DIVISOR);
        let last_filters = last_block_filters(width);

        let blocks = BLOCKS
            .iter()
            .enumerate()
            .map(|(id, &(filters, stride))| {
                let expansion = if id == 0 { 1 } else { DEFAULT_EXPANSION };
                let block = BlockConfig::new(filters, width)
                    .with_stride(stride)
                    .with_expansion(expansion)
                    .with_norm(norm);
                InvertedResidualBlock::new(&block, id, device)
            })
            .collect();

        Ok(Self {
            input_conv: Conv::new([3, input_filters], 3, 2, device),
            input_conv_bn: Norm::new(input_filters, norm, device),
            blocks,
            output_conv: Conv::pointwise([make_divisible(320, width, DEFAULT_DIVISOR), last_filters], device),
            output_conv_bn: Norm::new(last_filters, norm, device),
            avg_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(config.dropout).init(),
            output_classifier: Dense::new(last_filters, config.class_count, device),
            class_count: config.class_count,
            width_multiplier: width,
        })
    }

    /// Blocks 0 through 16.
    #[must_use]
    pub fn blocks(&self) -> &[InvertedResidualBlock<B>] {
        &self.blocks
    }

    /// Forward pass returning class logits `[N, class_count]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.input_conv.forward(pad_bottom_right(images));
        let x = relu6(self.input_conv_bn.forward(x));
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));
        let x = relu6(self.output_conv_bn.forward(self.output_conv.forward(x)));
        let pooled = self.avg_pool.forward(x);
        let [batch, channels, _, _] = pooled.dims();
        let features = self.dropout.forward(pooled.reshape([batch, channels]));
        self.output_classifier.forward(features)
    }
}

impl<B: Backend> NativeExport for PostureNetV2<B> {
    fn export_native(&self, scope: &ScopePath, store: &mut TensorStore) {
        self.input_conv.export_native(&scope.child("inputConv"), store);
        self.input_conv_bn.export_native(&scope.child("inputConvBN"), store);
        for block in &self.blocks {
            block.export_native(scope, store);
        }
        self.output_conv.export_native(&scope.child("outputConv"), store);
        self.output_conv_bn.export_native(&scope.child("outputConvBN"), store);
        self.output_classifier.export_native(&scope.child("outputClassifier"), store);
    }
}

impl<B: Backend> NativeImport for PostureNetV2<B> {
    fn import_native(&mut self, scope: &ScopePath, store: &TensorStore, report: &mut LoadReport) {
        self.input_conv.import_native(&scope.child("inputConv"), store, report);
        self.input_conv_bn.import_native(&scope.child("inputConvBN"), store, report);
        for block in &mut self.blocks {
            block.import_native(scope, store, report);
        }
        self.output_conv.import_native(&scope.child("outputConv"), store, report);
        self.output_conv_bn.import_native(&scope.child("outputConvBN"), store, report);
        self.output_classifier.import_native(&scope.child("outputClassifier"), store, report);
    }
}

/// Walks the backbone only; see [`MobileNetV2`](crate::MobileNetV2).
impl<B: Backend> ForeignImport for PostureNetV2<B> {
    fn import_foreign(&mut self, store: &TensorStore, counter: &mut LayerCounter, report: &mut LoadReport) {
        self.input_conv.import_foreign(store, counter, report);
        self.input_conv_bn.import_foreign(store, counter, report);
        for block in &mut self.blocks {
            block.import_foreign(store, counter, report);
        }
        self.output_conv.import_foreign(store, counter, report);
        self.output_conv_bn.import_foreign(store, counter, report);
    }
}

impl<B: Backend> Summarize for PostureNetV2<B> {
    fn summarize(&self, scope: &ScopePath, summary: &mut Summary) {
        summary.nested("PostureNetV2", scope.as_str(), |s| {
            s.marker("ZeroPadding2D", scope.child("inputPad").as_str());
            self.input_conv.summarize(&scope.child("inputConv"), s);
            self.input_conv_bn.summarize(&scope.child("inputConvBN"), s);
            s.marker("ReLU", scope.child("inputReLU").as_str());
            for block in &self.blocks {
                block.summarize(scope, s);
            }
            self.output_conv.summarize(&scope.child("outputConv"), s);
            self.output_conv_bn.summarize(&scope.child("outputConvBN"), s);
            s.marker("ReLU", scope.child("outputConvReLU").as_str());
            s.marker("GlobalAvgPool2D", scope.child("avgPool").as_str());
            self.output_classifier.summarize(&scope.child("outputClassifier"), s);
        });
    }
}

impl<B: Backend> ImageClassifier for PostureNetV2<B> {
    type Backend = B;

    fn architecture(&self) -> Architecture {
        Architecture::PostureNetV2
    }

    fn class_count(&self) -> usize {
        self.class_count
    }

    fn width_multiplier(&self) -> f32 {
        self.width_multiplier
    }

    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        Self::forward(self, images)
    }

    fn classifier_mut(&mut self) -> &mut Dense<B> {
        &mut self.output_classifier
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn config_default() {
        let config = PostureNetV2Config::default();
        assert_eq!(config.class_count, 2);
        assert!((config.dropout - 0.2).abs() < f64::EPSILON);
        assert!((config.norm.momentum - 0.001).abs() < 1e-9);
        assert!(config.is_valid());
    }

    #[test]
    fn config_rejects_bad_dropout() {
        let config = PostureNetV2Config::default().with_dropout(1.0);
        assert!(!config.is_valid());
        assert!(matches!(config.validate(), Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn block_roles_and_residuals() {
        let device = Default::default();
        let config = PostureNetV2Config::default();
        let model = PostureNetV2::<TestBackend>::new(&config, &device).expect("valid config");
        let roles: Vec<String> = model.blocks().iter().map(InvertedResidualBlock::role).collect();
        assert_eq!(roles[0], "expanded");
        assert_eq!(roles[16], "block_16");
        assert!(!model.blocks()[0].expands());
        assert!(model.blocks()[1].expands());

        let residual: Vec<usize> = model
            .blocks()
            .iter()
            .enumerate()
            .filter(|(_, b)| b.add_residual())
            .map(|(id, _)| id)
            .collect();
        assert_eq!(residual, vec![2, 4, 5, 7, 8, 9, 11, 12, 14, 15]);
    }

    #[test]
    fn forward_output_shape() {
        let device = Default::default();
        let config = PostureNetV2Config::default().with_width_multiplier(0.35);
        let model = PostureNetV2::<TestBackend>::new(&config, &device).expect("valid config");
        let logits = model.forward(Tensor::zeros([1, 3, 32, 32], &device));
        assert_eq!(logits.dims(), [1, 2]);
    }

    #[test]
    fn native_keys_under_block_scopes() {
        let device = Default::default();
        let config = PostureNetV2Config::default().with_width_multiplier(0.35);
        let model = PostureNetV2::<TestBackend>::new(&config, &device).expect("valid config");
        let mut store = TensorStore::new();
        model.export_native(&ScopePath::root("model"), &mut store);

        assert!(store.contains("model/inputConv/w"));
        assert!(store.contains("model/expanded/dConv/w"));
        assert!(!store.contains("model/expanded/conv1/w"));
        assert!(store.contains("model/block_1/conv1/w"));
        assert!(store.contains("model/block_16/conv2BN/v"));
        assert!(store.contains("model/outputClassifier/b"));
        // inputConv + BN, block 0 (4 layers), 16 blocks x 6 layers, outputConv + BN, dense
        let convs = 1 + 2 + 16 * 3 + 1;
        let norms = 1 + 2 + 16 * 3 + 1;
        assert_eq!(store.len(), convs * 2 + norms * 4 + 2);
    }
}
