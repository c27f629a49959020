//! `MobileNetV2` image classifier.
//!
//! Sandler et al., "MobileNetV2: Inverted Residuals and Linear Bottlenecks",
//! arXiv:1801.04381.

use burn::module::Module;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::prelude::Backend;
use burn::tensor::Tensor;
use ml_checkpoint::{
    ForeignImport, LayerCounter, LoadReport, NativeExport, NativeImport, ScopePath, Summarize, Summary,
    TensorStore,
};
use serde::{Deserialize, Serialize};

use crate::blocks::{BlockConfig, InitialInvertedBottleneckBlock, InvertedBottleneckBlock, InvertedBottleneckBlockStack};
use crate::channels::{DEFAULT_DIVISOR, make_divisible};
use crate::checkpoint::{Architecture, ImageClassifier};
use crate::error::{ModelError, Result};
use crate::layers::{Conv, Dense, Norm, NormConfig, pad_bottom_right, relu6};

/// Nominal `(input, output)` channels, block count and initial stride of
/// each residual stack.
const STACKS: [((usize, usize), usize, usize); 5] = [
    ((16, 24), 2, 2),
    ((24, 32), 3, 2),
    ((32, 64), 4, 2),
    ((64, 96), 3, 1),
    ((96, 160), 3, 2),
];

/// Width of the final 1x1 convolution.
///
/// Narrow models keep the full 1280 channels.
#[must_use]
pub fn last_block_filters(width_multiplier: f32) -> usize {
    if width_multiplier < 1.0 {
        1280
    } else {
        make_divisible(1280, width_multiplier, DEFAULT_DIVISOR)
    }
}

/// Configuration for [`MobileNetV2`].
///
/// # Example
///
/// ```
/// use ml_models::MobileNetV2Config;
///
/// let config = MobileNetV2Config::default().with_class_count(10);
/// assert_eq!(config.class_count, 10);
/// assert!(config.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MobileNetV2Config {
    /// Number of output classes.
    pub class_count: usize,

    /// Width multiplier applied to every channel count.
    pub width_multiplier: f32,
}

impl Default for MobileNetV2Config {
    fn default() -> Self {
        Self {
            class_count: 1000,
            width_multiplier: 1.0,
        }
    }
}

impl MobileNetV2Config {
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

    /// Returns `true` if the class count and width multiplier are positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.class_count > 0 && self.width_multiplier.is_finite() && self.width_multiplier > 0.0
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
        if !self.is_valid() {
            return Err(ModelError::invalid_config(format!(
                "width_multiplier must be positive, got {}",
                self.width_multiplier
            )));
        }
        Ok(())
    }
}

/// `MobileNetV2` classifier over `[N, 3, H, W]` images.
///
/// Architecture: zero-pad -> 3x3/2 conv -> BN -> `ReLU6` -> initial
/// bottleneck -> five bottleneck stacks -> bottleneck -> 1x1 conv -> BN ->
/// `ReLU6` -> global average pool -> dense.
#[derive(Module, Debug)]
pub struct MobileNetV2<B: Backend> {
    input_conv: Conv<B>,
    input_conv_bn: Norm<B>,
    init_bottleneck: InitialInvertedBottleneckBlock<B>,
    residual_stacks: Vec<InvertedBottleneckBlockStack<B>>,
    bottleneck16: InvertedBottleneckBlock<B>,
    output_conv: Conv<B>,
    output_conv_bn: Norm<B>,
    avg_pool: AdaptiveAvgPool2d,
    output_classifier: Dense<B>,
    class_count: usize,
    width_multiplier: f32,
}

impl<B: Backend> MobileNetV2<B> {
    /// Builds the network.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: &MobileNetV2Config, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let width = config.width_multiplier;
        let norm = NormConfig::default();
        let input_filters = make_divisible(32, width, DEFAULT_DIVISOR);
        let last_filters = last_block_filters(width);

        let residual_stacks = STACKS
            .iter()
            .map(|&(filters, count, stride)| {
                let first = BlockConfig::new(filters, width).with_stride(stride).with_norm(norm);
                InvertedBottleneckBlockStack::new(&first, count, device)
            })
            .collect();

        Ok(Self {
            input_conv: Conv::new([3, input_filters], 3, 2, device),
            input_conv_bn: Norm::new(input_filters, norm, device),
            init_bottleneck: InitialInvertedBottleneckBlock::new((32, 16), width, norm, device),
            residual_stacks,
            bottleneck16: InvertedBottleneckBlock::new(&BlockConfig::new((160, 320), width).with_norm(norm), device),
            output_conv: Conv::pointwise([make_divisible(320, width, DEFAULT_DIVISOR), last_filters], device),
            output_conv_bn: Norm::new(last_filters, norm, device),
            avg_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            output_classifier: Dense::new(last_filters, config.class_count, device),
            class_count: config.class_count,
            width_multiplier: width,
        })
    }

    /// Forward pass returning class logits `[N, class_count]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.input_conv.forward(pad_bottom_right(images));
        let x = relu6(self.input_conv_bn.forward(x));
        let x = self.init_bottleneck.forward(x);
        let x = self.residual_stacks.iter().fold(x, |x, stack| stack.forward(x));
        let x = self.bottleneck16.forward(x);
        let x = relu6(self.output_conv_bn.forward(self.output_conv.forward(x)));
        let pooled = self.avg_pool.forward(x);
        let [batch, channels, _, _] = pooled.dims();
        self.output_classifier.forward(pooled.reshape([batch, channels]))
    }

    fn stack_role(index: usize) -> String {
        format!("residual{}", index + 1)
    }
}

impl<B: Backend> NativeExport for MobileNetV2<B> {
    fn export_native(&self, scope: &ScopePath, store: &mut TensorStore) {
        self.input_conv.export_native(&scope.child("inputConv"), store);
        self.input_conv_bn.export_native(&scope.child("inputConvBN"), store);
        self.init_bottleneck.export_native(&scope.child("initBottleneck"), store);
        for (index, stack) in self.residual_stacks.iter().enumerate() {
            stack.export_native(&scope.child(&Self::stack_role(index)), store);
        }
        self.bottleneck16.export_native(&scope.child("Bottleneck16"), store);
        self.output_conv.export_native(&scope.child("outputConv"), store);
        self.output_conv_bn.export_native(&scope.child("outputConvBN"), store);
        self.output_classifier.export_native(&scope.child("outputClassifier"), store);
    }
}

impl<B: Backend> NativeImport for MobileNetV2<B> {
    fn import_native(&mut self, scope: &ScopePath, store: &TensorStore, report: &mut LoadReport) {
        self.input_conv.import_native(&scope.child("inputConv"), store, report);
        self.input_conv_bn.import_native(&scope.child("inputConvBN"), store, report);
        self.init_bottleneck.import_native(&scope.child("initBottleneck"), store, report);
        for (index, stack) in self.residual_stacks.iter_mut().enumerate() {
            stack.import_native(&scope.child(&Self::stack_role(index)), store, report);
        }
        self.bottleneck16.import_native(&scope.child("Bottleneck16"), store, report);
        self.output_conv.import_native(&scope.child("outputConv"), store, report);
        self.output_conv_bn.import_native(&scope.child("outputConvBN"), store, report);
        self.output_classifier.import_native(&scope.child("outputClassifier"), store, report);
    }
}

/// Walks the backbone only. The classifier sits outside the backbone's
/// numbering and is loaded by the checkpoint entry point.
impl<B: Backend> ForeignImport for MobileNetV2<B> {
    fn import_foreign(&mut self, store: &TensorStore, counter: &mut LayerCounter, report: &mut LoadReport) {
        self.input_conv.import_foreign(store, counter, report);
        self.input_conv_bn.import_foreign(store, counter, report);
        self.init_bottleneck.import_foreign(store, counter, report);
        for stack in &mut self.residual_stacks {
            stack.import_foreign(store, counter, report);
        }
        self.bottleneck16.import_foreign(store, counter, report);
        self.output_conv.import_foreign(store, counter, report);
        self.output_conv_bn.import_foreign(store, counter, report);
    }
}

impl<B: Backend> Summarize for MobileNetV2<B> {
    fn summarize(&self, scope: &ScopePath, summary: &mut Summary) {
        summary.nested("MobileNetV2", scope.as_str(), |s| {
            s.marker("ZeroPadding2D", scope.child("inputPad").as_str());
            self.input_conv.summarize(&scope.child("inputConv"), s);
            self.input_conv_bn.summarize(&scope.child("inputConvBN"), s);
            self.init_bottleneck.summarize(&scope.child("initBottleneck"), s);
            for (index, stack) in self.residual_stacks.iter().enumerate() {
                stack.summarize(&scope.child(&Self::stack_role(index)), s);
            }
            self.bottleneck16.summarize(&scope.child("Bottleneck16"), s);
            self.output_conv.summarize(&scope.child("outputConv"), s);
            self.output_conv_bn.summarize(&scope.child("outputConvBN"), s);
            s.marker("GlobalAvgPool2D", scope.child("avgPool").as_str());
            self.output_classifier.summarize(&scope.child("outputClassifier"), s);
        });
    }
}

impl<B: Backend> ImageClassifier for MobileNetV2<B> {
    type Backend = B;

    fn architecture(&self) -> Architecture {
        Architecture::MobileNetV2
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
