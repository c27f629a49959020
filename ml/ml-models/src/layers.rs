//! Layer nodes: the leaves of every model tree.
//!
//! Each node wraps one Burn layer and implements the traversal traits for
//! the tensors that layer owns:
//!
//! | Node | Native | Foreign |
//! |------|--------|---------|
//! | [`Conv`] | `w`, `b` | `kernel` |
//! | [`DepthwiseConv`] | `w`, `b` | `depthwise_kernel` |
//! | [`Norm`] | `w`, `b`, `m`, `v` | `gamma`, `beta`, `moving_mean`, `moving_variance` |
//! | [`Dense`] | `w`, `b` | `kernel`, `bias` |
//!
//! Convolution biases are zero at construction. Foreign models are
//! bias-free, so an imported convolution keeps that zero bias.

use burn::module::{Module, Param};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d};
use burn::prelude::Backend;
use burn::tensor::Tensor;
use ml_checkpoint::{
    ForeignImport, KerasLayout, LayerCounter, LoadReport, NativeExport, NativeImport, ScopePath,
    ShapePolicy, Summarize, Summary, TensorStore, export_tensor, load_foreign_tensor, load_native_tensor,
};
use serde::{Deserialize, Serialize};

/// Native short names for filters and weights, current spelling first.
const WEIGHT_KEYS: [&str; 2] = ["w", "weight"];
const FILTER_KEYS: [&str; 2] = ["w", "filter"];
const BIAS_KEYS: [&str; 2] = ["b", "bias"];
const SCALE_KEYS: [&str; 2] = ["w", "scale"];
const OFFSET_KEYS: [&str; 2] = ["b", "offset"];
const MEAN_KEYS: [&str; 2] = ["m", "runningMean"];
const VARIANCE_KEYS: [&str; 2] = ["v", "runningVariance"];

/// Clamps activations to `[0, 6]`.
pub fn relu6<B: Backend, const D: usize>(input: Tensor<B, D>) -> Tensor<B, D> {
    input.clamp(0.0, 6.0)
}

/// Pads one row at the bottom and one column at the right.
///
/// Applied before every strided convolution, which then runs unpadded.
pub fn pad_bottom_right<B: Backend>(input: Tensor<B, 4>) -> Tensor<B, 4> {
    input.pad((0, 1, 0, 1), 0.0)
}

/// Batch normalization hyperparameters.
///
/// `momentum` follows the Burn convention: the weight of the *new* batch
/// statistic in the running average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormConfig {
    /// Running-average momentum (Burn convention).
    pub momentum: f64,

    /// Variance epsilon.
    pub epsilon: f64,
}

impl Default for NormConfig {
    fn default() -> Self {
        Self {
            momentum: 0.01,
            epsilon: 1e-3,
        }
    }
}

impl NormConfig {
    /// Creates a configuration from a momentum given as the weight of the
    /// *old* running value, the convention of the foreign framework.
    #[must_use]
    pub fn from_decay(decay: f64, epsilon: f64) -> Self {
        Self {
            momentum: 1.0 - decay,
            epsilon,
        }
    }
}

fn padding_for(stride: usize) -> PaddingConfig2d {
    if stride == 1 {
        PaddingConfig2d::Same
    } else {
        PaddingConfig2d::Valid
    }
}

/// Regular 2-D convolution.
#[derive(Module, Debug)]
pub struct Conv<B: Backend> {
    /// Wrapped layer, weight layout `[out, in, kh, kw]`.
    pub inner: Conv2d<B>,
}

impl<B: Backend> Conv<B> {
    /// Creates a square convolution. Stride 1 keeps the spatial size; any
    /// other stride runs unpadded.
    pub fn new(channels: [usize; 2], kernel: usize, stride: usize, device: &B::Device) -> Self {
        let mut inner = Conv2dConfig::new(channels, [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(padding_for(stride))
            .init(device);
        inner.bias = Some(Param::from_tensor(Tensor::zeros([channels[1]], device)));
        Self { inner }
    }

    /// Creates a 1x1 pointwise convolution.
    pub fn pointwise(channels: [usize; 2], device: &B::Device) -> Self {
        Self::new(channels, 1, 1, device)
    }

    /// Applies the convolution.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.inner.forward(input)
    }
}

impl<B: Backend> NativeExport for Conv<B> {
    fn export_native(&self, scope: &ScopePath, store: &mut TensorStore) {
        export_tensor(&self.inner.weight, scope.param("w"), store);
        if let Some(bias) = &self.inner.bias {
            export_tensor(bias, scope.param("b"), store);
        }
    }
}

impl<B: Backend> NativeImport for Conv<B> {
    fn import_native(&mut self, scope: &ScopePath, store: &TensorStore, report: &mut LoadReport) {
        load_native_tensor(&mut self.inner.weight, scope, &FILTER_KEYS, store, ShapePolicy::Strict, report);
        if let Some(bias) = &mut self.inner.bias {
            load_native_tensor(bias, scope, &BIAS_KEYS, store, ShapePolicy::Strict, report);
        }
    }
}

impl<B: Backend> ForeignImport for Conv<B> {
    fn import_foreign(&mut self, store: &TensorStore, counter: &mut LayerCounter, report: &mut LoadReport) {
        let key = counter.key("kernel");
        load_foreign_tensor(&mut self.inner.weight, &key, KerasLayout::Kernel, store, ShapePolicy::Strict, report);
        counter.advance();
    }
}

impl<B: Backend> Summarize for Conv<B> {
    fn summarize(&self, scope: &ScopePath, summary: &mut Summary) {
        summary.layer("Conv2D", scope.as_str(), conv_shapes(&self.inner));
    }
}

/// Depthwise 3x3 convolution with a channel multiplier of one.
#[derive(Module, Debug)]
pub struct DepthwiseConv<B: Backend> {
    /// Wrapped grouped layer, weight layout `[channels, 1, kh, kw]`.
    pub inner: Conv2d<B>,
}

impl<B: Backend> DepthwiseConv<B> {
    /// Creates a depthwise convolution over `channels` channels.
    pub fn new(channels: usize, stride: usize, device: &B::Device) -> Self {
        let mut inner = Conv2dConfig::new([channels, channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(padding_for(stride))
            .with_groups(channels)
            .init(device);
        inner.bias = Some(Param::from_tensor(Tensor::zeros([channels], device)));
        Self { inner }
    }

    /// Applies the convolution.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.inner.forward(input)
    }
}

impl<B: Backend> NativeExport for DepthwiseConv<B> {
    fn export_native(&self, scope: &ScopePath, store: &mut TensorStore) {
        export_tensor(&self.inner.weight, scope.param("w"), store);
        if let Some(bias) = &self.inner.bias {
            export_tensor(bias, scope.param("b"), store);
        }
    }
}

impl<B: Backend> NativeImport for DepthwiseConv<B> {
    fn import_native(&mut self, scope: &ScopePath, store: &TensorStore, report: &mut LoadReport) {
        load_native_tensor(&mut self.inner.weight, scope, &FILTER_KEYS, store, ShapePolicy::Strict, report);
        if let Some(bias) = &mut self.inner.bias {
            load_native_tensor(bias, scope, &BIAS_KEYS, store, ShapePolicy::Strict, report);
        }
    }
}

impl<B: Backend> ForeignImport for DepthwiseConv<B> {
    fn import_foreign(&mut self, store: &TensorStore, counter: &mut LayerCounter, report: &mut LoadReport) {
        let key = counter.key("depthwise_kernel");
        load_foreign_tensor(&mut self.inner.weight, &key, KerasLayout::DepthwiseKernel, store, ShapePolicy::Strict, report);
        counter.advance();
    }
}

impl<B: Backend> Summarize for DepthwiseConv<B> {
    fn summarize(&self, scope: &ScopePath, summary: &mut Summary) {
        summary.layer("DepthwiseConv2D", scope.as_str(), conv_shapes(&self.inner));
    }
}

fn conv_shapes<B: Backend>(conv: &Conv2d<B>) -> Vec<Vec<usize>> {
    let mut shapes = vec![conv.weight.dims().to_vec()];
    if let Some(bias) = &conv.bias {
        shapes.push(bias.dims().to_vec());
    }
    shapes
}

/// Batch normalization over the channel axis.
#[derive(Module, Debug)]
pub struct Norm<B: Backend> {
    /// Wrapped layer.
    pub inner: BatchNorm<B, 2>,
}

impl<B: Backend> Norm<B> {
    /// Creates a normalization layer over `features` channels.
    pub fn new(features: usize, config: NormConfig, device: &B::Device) -> Self {
        let inner = BatchNormConfig::new(features)
            .with_momentum(config.momentum)
            .with_epsilon(config.epsilon)
            .init(device);
        Self { inner }
    }

    /// Normalizes an `[N, C, H, W]` batch.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.inner.forward(input)
    }
}

impl<B: Backend> NativeExport for Norm<B> {
    fn export_native(&self, scope: &ScopePath, store: &mut TensorStore) {
        export_tensor(&self.inner.gamma, scope.param("w"), store);
        export_tensor(&self.inner.beta, scope.param("b"), store);
        export_tensor(&self.inner.running_mean, scope.param("m"), store);
        export_tensor(&self.inner.running_var, scope.param("v"), store);
    }
}

impl<B: Backend> NativeImport for Norm<B> {
    fn import_native(&mut self, scope: &ScopePath, store: &TensorStore, report: &mut LoadReport) {
        load_native_tensor(&mut self.inner.gamma, scope, &SCALE_KEYS, store, ShapePolicy::Strict, report);
        load_native_tensor(&mut self.inner.beta, scope, &OFFSET_KEYS, store, ShapePolicy::Strict, report);
        // Running statistics: first present key wins.
        load_native_tensor(&mut self.inner.running_mean, scope, &MEAN_KEYS, store, ShapePolicy::Relaxed, report);
        load_native_tensor(&mut self.inner.running_var, scope, &VARIANCE_KEYS, store, ShapePolicy::Relaxed, report);
    }
}

impl<B: Backend> ForeignImport for Norm<B> {
    fn import_foreign(&mut self, store: &TensorStore, counter: &mut LayerCounter, report: &mut LoadReport) {
        let (layout, strict, relaxed) = (KerasLayout::Plain, ShapePolicy::Strict, ShapePolicy::Relaxed);
        load_foreign_tensor(&mut self.inner.gamma, &counter.key("gamma"), layout, store, strict, report);
        load_foreign_tensor(&mut self.inner.beta, &counter.key("beta"), layout, store, strict, report);
        let (mean_key, variance_key) = (counter.key("moving_mean"), counter.key("moving_variance"));
        load_foreign_tensor(&mut self.inner.running_mean, &mean_key, layout, store, relaxed, report);
        load_foreign_tensor(&mut self.inner.running_var, &variance_key, layout, store, relaxed, report);
        counter.advance();
    }
}

impl<B: Backend> Summarize for Norm<B> {
    fn summarize(&self, scope: &ScopePath, summary: &mut Summary) {
        let shape = self.inner.gamma.dims().to_vec();
        summary.layer("BatchNorm", scope.as_str(), vec![shape; 4]);
    }
}

/// Fully connected layer, weight layout `[in, out]`.
#[derive(Module, Debug)]
pub struct Dense<B: Backend> {
    /// Wrapped layer.
    pub inner: Linear<B>,
}

impl<B: Backend> Dense<B> {
    /// Creates a dense layer.
    pub fn new(inputs: usize, outputs: usize, device: &B::Device) -> Self {
        Self {
            inner: LinearConfig::new(inputs, outputs).init(device),
        }
    }

    /// Applies the affine map to an `[N, in]` batch.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.inner.forward(input)
    }
}

impl<B: Backend> NativeExport for Dense<B> {
    fn export_native(&self, scope: &ScopePath, store: &mut TensorStore) {
        export_tensor(&self.inner.weight, scope.param("w"), store);
        if let Some(bias) = &self.inner.bias {
            export_tensor(bias, scope.param("b"), store);
        }
    }
}

impl<B: Backend> NativeImport for Dense<B> {
    fn import_native(&mut self, scope: &ScopePath, store: &TensorStore, report: &mut LoadReport) {
        load_native_tensor(&mut self.inner.weight, scope, &WEIGHT_KEYS, store, ShapePolicy::Strict, report);
        if let Some(bias) = &mut self.inner.bias {
            load_native_tensor(bias, scope, &BIAS_KEYS, store, ShapePolicy::Strict, report);
        }
    }
}

impl<B: Backend> ForeignImport for Dense<B> {
    fn import_foreign(&mut self, store: &TensorStore, counter: &mut LayerCounter, report: &mut LoadReport) {
        load_foreign_tensor(&mut self.inner.weight, &counter.key("kernel"), KerasLayout::Plain, store, ShapePolicy::Strict, report);
        if let Some(bias) = &mut self.inner.bias {
            load_foreign_tensor(bias, &counter.key("bias"), KerasLayout::Plain, store, ShapePolicy::Strict, report);
        }
        counter.advance();
    }
}

impl<B: Backend> Summarize for Dense<B> {
    fn summarize(&self, scope: &ScopePath, summary: &mut Summary) {
        let mut shapes = vec![self.inner.weight.dims().to_vec()];
        if let Some(bias) = &self.inner.bias {
            shapes.push(bias.dims().to_vec());
        }
        summary.layer("Dense", scope.as_str(), shapes);
    }
}
