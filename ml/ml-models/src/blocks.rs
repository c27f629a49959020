//! Composite nodes: inverted bottleneck blocks and block stacks.

use burn::module::Module;
use burn::prelude::Backend;
use burn::tensor::Tensor;
use ml_checkpoint::{
    ForeignImport, LayerCounter, LoadReport, NativeExport, NativeImport, ScopePath, Summarize, Summary,
    TensorStore,
};

use crate::channels::round_filter_pair;
use crate::layers::{Conv, DepthwiseConv, Norm, NormConfig, pad_bottom_right, relu6};

/// Default expansion factor of a bottleneck block.
pub const DEFAULT_EXPANSION: usize = 6;

/// Returns `true` if a block with these channels and stride adds its input
/// to its output.
#[must_use]
pub const fn has_residual(filters: (usize, usize), stride: usize) -> bool {
    filters.0 == filters.1 && stride == 1
}

/// Hyperparameters of one inverted bottleneck block.
///
/// `filters` are nominal channel counts, rounded with `width_multiplier`
/// at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockConfig {
    /// Nominal `(input, output)` channels.
    pub filters: (usize, usize),

    /// Width multiplier.
    pub width_multiplier: f32,

    /// Expansion factor of the hidden layer.
    pub expansion: usize,

    /// Stride of the depthwise convolution.
    pub stride: usize,

    /// Normalization hyperparameters.
    pub norm: NormConfig,
}

impl BlockConfig {
    /// Creates a stride-1 block with the default expansion.
    #[must_use]
    pub fn new(filters: (usize, usize), width_multiplier: f32) -> Self {
        Self {
            filters,
            width_multiplier,
            expansion: DEFAULT_EXPANSION,
            stride: 1,
            norm: NormConfig::default(),
        }
    }

    /// Sets the depthwise stride.
    #[must_use]
    pub const fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    /// Sets the expansion factor.
    #[must_use]
    pub const fn with_expansion(mut self, expansion: usize) -> Self {
        self.expansion = expansion;
        self
    }

    /// Sets the normalization hyperparameters.
    #[must_use]
    pub const fn with_norm(mut self, norm: NormConfig) -> Self {
        self.norm = norm;
        self
    }
}

/// First block of `MobileNetV2`: depthwise convolution then projection,
/// with no expansion.
#[derive(Module, Debug)]
pub struct InitialInvertedBottleneckBlock<B: Backend> {
    d_conv: DepthwiseConv<B>,
    d_conv_bn: Norm<B>,
    conv2: Conv<B>,
    conv_bn: Norm<B>,
}

impl<B: Backend> InitialInvertedBottleneckBlock<B> {
    /// Creates the block.
    pub fn new(filters: (usize, usize), width_multiplier: f32, norm: NormConfig, device: &B::Device) -> Self {
        let (input, output) = round_filter_pair(filters, width_multiplier);
        Self {
            d_conv: DepthwiseConv::new(input, 1, device),
            d_conv_bn: Norm::new(input, norm, device),
            conv2: Conv::pointwise([input, output], device),
            conv_bn: Norm::new(output, norm, device),
        }
    }

    /// Applies the block.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let depthwise = relu6(self.d_conv_bn.forward(self.d_conv.forward(input)));
        self.conv_bn.forward(self.conv2.forward(depthwise))
    }
}

impl<B: Backend> NativeExport for InitialInvertedBottleneckBlock<B> {
    fn export_native(&self, scope: &ScopePath, store: &mut TensorStore) {
        self.d_conv.export_native(&scope.child("dConv"), store);
        self.d_conv_bn.export_native(&scope.child("dConvBN"), store);
        self.conv2.export_native(&scope.child("conv2"), store);
        self.conv_bn.export_native(&scope.child("convBN"), store);
    }
}

impl<B: Backend> NativeImport for InitialInvertedBottleneckBlock<B> {
    fn import_native(&mut self, scope: &ScopePath, store: &TensorStore, report: &mut LoadReport) {
        self.d_conv.import_native(&scope.child("dConv"), store, report);
        self.d_conv_bn.import_native(&scope.child("dConvBN"), store, report);
        self.conv2.import_native(&scope.child("conv2"), store, report);
        self.conv_bn.import_native(&scope.child("convBN"), store, report);
    }
}

impl<B: Backend> ForeignImport for InitialInvertedBottleneckBlock<B> {
    fn import_foreign(&mut self, store: &TensorStore, counter: &mut LayerCounter, report: &mut LoadReport) {
        self.d_conv.import_foreign(store, counter, report);
        self.d_conv_bn.import_foreign(store, counter, report);
        self.conv2.import_foreign(store, counter, report);
        self.conv_bn.import_foreign(store, counter, report);
    }
}

impl<B: Backend> Summarize for InitialInvertedBottleneckBlock<B> {
    fn summarize(&self, scope: &ScopePath, summary: &mut Summary) {
        summary.nested("InitialInvertedBottleneckBlock", scope.as_str(), |s| {
            self.d_conv.summarize(&scope.child("dConv"), s);
            self.d_conv_bn.summarize(&scope.child("dConvBN"), s);
            self.conv2.summarize(&scope.child("conv2"), s);
            self.conv_bn.summarize(&scope.child("convBN"), s);
        });
    }
}

/// Expand, depthwise-convolve, project, with an optional residual add.
#[derive(Module, Debug)]
pub struct InvertedBottleneckBlock<B: Backend> {
    conv1: Conv<B>,
    conv1_bn: Norm<B>,
    d_conv: DepthwiseConv<B>,
    d_conv_bn: Norm<B>,
    conv2: Conv<B>,
    conv2_bn: Norm<B>,
    stride: usize,
    add_residual: bool,
}

impl<B: Backend> InvertedBottleneckBlock<B> {
    /// Creates the block.
    pub fn new(config: &BlockConfig, device: &B::Device) -> Self {
        let (input, output) = round_filter_pair(config.filters, config.width_multiplier);
        let hidden = input * config.expansion;
        Self {
            conv1: Conv::pointwise([input, hidden], device),
            conv1_bn: Norm::new(hidden, config.norm, device),
            d_conv: DepthwiseConv::new(hidden, config.stride, device),
            d_conv_bn: Norm::new(hidden, config.norm, device),
            conv2: Conv::pointwise([hidden, output], device),
            conv2_bn: Norm::new(output, config.norm, device),
            stride: config.stride,
            add_residual: has_residual(config.filters, config.stride),
        }
    }

    /// Returns `true` if the block adds its input to its output.
    #[must_use]
    pub const fn add_residual(&self) -> bool {
        self.add_residual
    }

    /// Depthwise stride.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Applies the block.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let pointwise = relu6(self.conv1_bn.forward(self.conv1.forward(input.clone())));
        let pointwise = if self.stride == 1 {
            pointwise
        } else {
            pad_bottom_right(pointwise)
        };
        let depthwise = relu6(self.d_conv_bn.forward(self.d_conv.forward(pointwise)));
        let projected = self.conv2_bn.forward(self.conv2.forward(depthwise));
        if self.add_residual {
            input + projected
        } else {
            projected
        }
    }
}

impl<B: Backend> NativeExport for InvertedBottleneckBlock<B> {
    fn export_native(&self, scope: &ScopePath, store: &mut TensorStore) {
        self.conv1.export_native(&scope.child("conv1"), store);
        self.conv1_bn.export_native(&scope.child("conv1BN"), store);
        self.d_conv.export_native(&scope.child("dConv"), store);
        self.d_conv_bn.export_native(&scope.child("dConvBN"), store);
        self.conv2.export_native(&scope.child("conv2"), store);
        self.conv2_bn.export_native(&scope.child("conv2BN"), store);
    }
}

impl<B: Backend> NativeImport for InvertedBottleneckBlock<B> {
    fn import_native(&mut self, scope: &ScopePath, store: &TensorStore, report: &mut LoadReport) {
        self.conv1.import_native(&scope.child("conv1"), store, report);
        self.conv1_bn.import_native(&scope.child("conv1BN"), store, report);
        self.d_conv.import_native(&scope.child("dConv"), store, report);
        self.d_conv_bn.import_native(&scope.child("dConvBN"), store, report);
        self.conv2.import_native(&scope.child("conv2"), store, report);
        self.conv2_bn.import_native(&scope.child("conv2BN"), store, report);
    }
}

impl<B: Backend> ForeignImport for InvertedBottleneckBlock<B> {
    fn import_foreign(&mut self, store: &TensorStore, counter: &mut LayerCounter, report: &mut LoadReport) {
        self.conv1.import_foreign(store, counter, report);
        self.conv1_bn.import_foreign(store, counter, report);
        self.d_conv.import_foreign(store, counter, report);
        self.d_conv_bn.import_foreign(store, counter, report);
        self.conv2.import_foreign(store, counter, report);
        self.conv2_bn.import_foreign(store, counter, report);
    }
}

impl<B: Backend> Summarize for InvertedBottleneckBlock<B> {
    fn summarize(&self, scope: &ScopePath, summary: &mut Summary) {
        summary.nested("InvertedBottleneckBlock", scope.as_str(), |s| {
            self.conv1.summarize(&scope.child("conv1"), s);
            self.conv1_bn.summarize(&scope.child("conv1BN"), s);
            if self.stride != 1 {
                s.marker("ZeroPadding2D", scope.child("zeroPad").as_str());
            }
            self.d_conv.summarize(&scope.child("dConv"), s);
            self.d_conv_bn.summarize(&scope.child("dConvBN"), s);
            self.conv2.summarize(&scope.child("conv2"), s);
            self.conv2_bn.summarize(&scope.child("conv2BN"), s);
        });
    }
}

/// A run of bottleneck blocks sharing an output width.
///
/// The first block maps `(input, output)` with the stack's initial stride;
/// the rest map `(output, output)` at stride 1. Native keys index blocks
/// as `blocks/h<i>`.
#[derive(Module, Debug)]
pub struct InvertedBottleneckBlockStack<B: Backend> {
    blocks: Vec<InvertedBottleneckBlock<B>>,
}

impl<B: Backend> InvertedBottleneckBlockStack<B> {
    /// Creates a stack of `block_count` blocks.
    pub fn new(first: &BlockConfig, block_count: usize, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(block_count);
        blocks.push(InvertedBottleneckBlock::new(first, device));
        let rest = BlockConfig {
            filters: (first.filters.1, first.filters.1),
            stride: 1,
            ..*first
        };
        for _ in 1..block_count {
            blocks.push(InvertedBottleneckBlock::new(&rest, device));
        }
        Self { blocks }
    }

    /// Blocks in order.
    #[must_use]
    pub fn blocks(&self) -> &[InvertedBottleneckBlock<B>] {
        &self.blocks
    }

    /// Applies every block in order.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(input, |x, block| block.forward(x))
    }
}

impl<B: Backend> NativeExport for InvertedBottleneckBlockStack<B> {
    fn export_native(&self, scope: &ScopePath, store: &mut TensorStore) {
        for (index, block) in self.blocks.iter().enumerate() {
            block.export_native(&scope.repeated(index), store);
        }
    }
}

impl<B: Backend> NativeImport for InvertedBottleneckBlockStack<B> {
    fn import_native(&mut self, scope: &ScopePath, store: &TensorStore, report: &mut LoadReport) {
        for (index, block) in self.blocks.iter_mut().enumerate() {
            block.import_native(&scope.repeated(index), store, report);
        }
    }
}

impl<B: Backend> ForeignImport for InvertedBottleneckBlockStack<B> {
    fn import_foreign(&mut self, store: &TensorStore, counter: &mut LayerCounter, report: &mut LoadReport) {
        for block in &mut self.blocks {
            block.import_foreign(store, counter, report);
        }
    }
}

impl<B: Backend> Summarize for InvertedBottleneckBlockStack<B> {
    fn summarize(&self, scope: &ScopePath, summary: &mut Summary) {
        summary.nested("InvertedBottleneckBlockStack", scope.as_str(), |s| {
            for (index, block) in self.blocks.iter().enumerate() {
                block.summarize(&scope.repeated(index), s);
            }
        });
    }
}

/// `PostureNetV2` block. Block 0 has no expansion convolution.
///
/// Scopes are `expanded` for block 0 and `block_<id>` for the rest, all
/// directly under the model root.
#[derive(Module, Debug)]
pub struct InvertedResidualBlock<B: Backend> {
    conv1: Option<Conv<B>>,
    conv1_bn: Option<Norm<B>>,
    d_conv: DepthwiseConv<B>,
    d_conv_bn: Norm<B>,
    conv2: Conv<B>,
    conv2_bn: Norm<B>,
    id: usize,
    stride: usize,
    add_residual: bool,
}

impl<B: Backend> InvertedResidualBlock<B> {
    /// Creates block `id`. Block 0 skips the expansion convolution.
    pub fn new(config: &BlockConfig, id: usize, device: &B::Device) -> Self {
        let (input, output) = round_filter_pair(config.filters, config.width_multiplier);
        let hidden = input * config.expansion;
        let expand = id > 0;
        Self {
            conv1: expand.then(|| Conv::pointwise([input, hidden], device)),
            conv1_bn: expand.then(|| Norm::new(hidden, config.norm, device)),
            d_conv: DepthwiseConv::new(hidden, config.stride, device),
            d_conv_bn: Norm::new(hidden, config.norm, device),
            conv2: Conv::pointwise([hidden, output], device),
            conv2_bn: Norm::new(output, config.norm, device),
            id,
            stride: config.stride,
            add_residual: has_residual(config.filters, config.stride),
        }
    }

    /// Role name of this block under the model root.
    #[must_use]
    pub fn role(&self) -> String {
        if self.id > 0 {
            format!("block_{}", self.id)
        } else {
            "expanded".to_string()
        }
    }

    /// Returns `true` if the block adds its input to its output.
    #[must_use]
    pub const fn add_residual(&self) -> bool {
        self.add_residual
    }

    /// Returns `true` if the block has an expansion convolution.
    #[must_use]
    pub const fn expands(&self) -> bool {
        self.conv1.is_some()
    }

    /// Applies the block.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let pointwise = match (&self.conv1, &self.conv1_bn) {
            (Some(conv), Some(norm)) => relu6(norm.forward(conv.forward(input.clone()))),
            _ => input.clone(),
        };
        let pointwise = if self.stride == 1 {
            pointwise
        } else {
            pad_bottom_right(pointwise)
        };
        let depthwise = relu6(self.d_conv_bn.forward(self.d_conv.forward(pointwise)));
        let projected = self.conv2_bn.forward(self.conv2.forward(depthwise));
        if self.add_residual {
            input + projected
        } else {
            projected
        }
    }
}

impl<B: Backend> NativeExport for InvertedResidualBlock<B> {
    fn export_native(&self, scope: &ScopePath, store: &mut TensorStore) {
        let scope = scope.child(&self.role());
        self.conv1.export_native(&scope.child("conv1"), store);
        self.conv1_bn.export_native(&scope.child("conv1BN"), store);
        self.d_conv.export_native(&scope.child("dConv"), store);
        self.d_conv_bn.export_native(&scope.child("dConvBN"), store);
        self.conv2.export_native(&scope.child("conv2"), store);
        self.conv2_bn.export_native(&scope.child("conv2BN"), store);
    }
}

impl<B: Backend> NativeImport for InvertedResidualBlock<B> {
    fn import_native(&mut self, scope: &ScopePath, store: &TensorStore, report: &mut LoadReport) {
        let scope = scope.child(&self.role());
        self.conv1.import_native(&scope.child("conv1"), store, report);
        self.conv1_bn.import_native(&scope.child("conv1BN"), store, report);
        self.d_conv.import_native(&scope.child("dConv"), store, report);
        self.d_conv_bn.import_native(&scope.child("dConvBN"), store, report);
        self.conv2.import_native(&scope.child("conv2"), store, report);
        self.conv2_bn.import_native(&scope.child("conv2BN"), store, report);
    }
}

impl<B: Backend> ForeignImport for InvertedResidualBlock<B> {
    fn import_foreign(&mut self, store: &TensorStore, counter: &mut LayerCounter, report: &mut LoadReport) {
        self.conv1.import_foreign(store, counter, report);
        self.conv1_bn.import_foreign(store, counter, report);
        self.d_conv.import_foreign(store, counter, report);
        self.d_conv_bn.import_foreign(store, counter, report);
        self.conv2.import_foreign(store, counter, report);
        self.conv2_bn.import_foreign(store, counter, report);
    }
}

impl<B: Backend> Summarize for InvertedResidualBlock<B> {
    fn summarize(&self, scope: &ScopePath, summary: &mut Summary) {
        let scope = scope.child(&self.role());
        summary.nested("InvertedResidualBlock", scope.as_str(), |s| {
            if self.expands() {
                self.conv1.summarize(&scope.child("conv1"), s);
                self.conv1_bn.summarize(&scope.child("conv1BN"), s);
                s.marker("ReLU", scope.child("conv1ReLU").as_str());
            }
            if self.stride != 1 {
                s.marker("ZeroPadding2D", scope.child("zeroPad").as_str());
            }
            self.d_conv.summarize(&scope.child("dConv"), s);
            self.d_conv_bn.summarize(&scope.child("dConvBN"), s);
            s.marker("ReLU", scope.child("dConvReLU").as_str());
            self.conv2.summarize(&scope.child("conv2"), s);
            self.conv2_bn.summarize(&scope.child("conv2BN"), s);
            if self.add_residual {
                s.marker("Add", scope.child("add").as_str());
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn residual_rule() {
        assert!(has_residual((24, 24), 1));
        assert!(!has_residual((16, 24), 2));
        assert!(!has_residual((16, 24), 1));
        assert!(!has_residual((24, 24), 2));
    }

    #[test]
    fn bottleneck_forward_shapes() {
        let device = Default::default();
        let same = InvertedBottleneckBlock::<TestBackend>::new(&BlockConfig::new((8, 8), 1.0), &device);
        assert!(same.add_residual());
        assert_eq!(same.forward(Tensor::zeros([1, 8, 6, 6], &device)).dims(), [1, 8, 6, 6]);

        let down = InvertedBottleneckBlock::<TestBackend>::new(&BlockConfig::new((8, 16), 1.0).with_stride(2), &device);
        assert!(!down.add_residual());
        assert_eq!(down.forward(Tensor::zeros([1, 8, 6, 6], &device)).dims(), [1, 16, 3, 3]);
    }

    #[test]
    fn stack_keys_index_blocks() {
        let device = Default::default();
        let config = BlockConfig::new((8, 16), 1.0).with_stride(2);
        let stack = InvertedBottleneckBlockStack::<TestBackend>::new(&config, 3, &device);
        assert_eq!(stack.blocks().len(), 3);
        assert_eq!(stack.blocks()[0].stride(), 2);
        assert!(stack.blocks()[1].add_residual());

        let mut store = TensorStore::new();
        stack.export_native(&ScopePath::root("model").child("residual1"), &mut store);
        for index in 0..3 {
            let key = format!("model/residual1/blocks/h{index}/conv1/w");
            assert!(store.contains(&key), "missing {key}");
        }
        // 6 layers per block: 3 convs x 2 tensors + 3 norms x 4 tensors
        assert_eq!(store.len(), 3 * 18);
    }

    #[test]
    fn block_zero_has_no_expansion() {
        let device = Default::default();
        let config = BlockConfig::new((32, 16), 1.0).with_expansion(1);
        let block = InvertedResidualBlock::<TestBackend>::new(&config, 0, &device);
        assert!(!block.expands());
        assert_eq!(block.role(), "expanded");

        let mut store = TensorStore::new();
        block.export_native(&ScopePath::root("model"), &mut store);
        assert!(!store.contains("model/expanded/conv1/w"));
        assert!(store.contains("model/expanded/dConv/w"));

        let mut counter = LayerCounter::new();
        let mut target = InvertedResidualBlock::<TestBackend>::new(&config, 0, &device);
        target.import_foreign(&store, &mut counter, &mut LoadReport::new());
        assert_eq!(counter.current(), 4);
    }

    #[test]
    fn expanding_block_advances_six_layers() {
        let device = Default::default();
        let config = BlockConfig::new((16, 24), 1.0).with_stride(2);
        let mut block = InvertedResidualBlock::<TestBackend>::new(&config, 1, &device);
        assert_eq!(block.role(), "block_1");

        let mut counter = LayerCounter::new();
        block.import_foreign(&TensorStore::new(), &mut counter, &mut LoadReport::new());
        assert_eq!(counter.current(), 6);
    }

    #[test]
    fn residual_block_summary_markers() {
        let device = Default::default();
        let config = BlockConfig::new((24, 24), 1.0);
        let block = InvertedResidualBlock::<TestBackend>::new(&config, 2, &device);
        let mut summary = Summary::new();
        block.summarize(&ScopePath::root("model"), &mut summary);

        let scopes: Vec<&str> = summary.records().iter().map(|r| r.scope.as_str()).collect();
        assert_eq!(scopes[0], "model/block_2");
        assert!(scopes.contains(&"model/block_2/conv1ReLU"));
        assert!(scopes.contains(&"model/block_2/add"));
        assert!(!scopes.contains(&"model/block_2/zeroPad"));
    }
}
