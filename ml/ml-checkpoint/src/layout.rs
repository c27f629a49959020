//! Memory-layout conversion between foreign and native kernels.
//!
//! Foreign convolution kernels are stored `[kh, kw, in, out]` and foreign
//! depthwise kernels `[kh, kw, channels, multiplier]`. The native engine
//! keeps `[out, in, kh, kw]` and `[channels * multiplier, 1, kh, kw]`.
//! Dense kernels (`[in, out]`) and vectors are laid out identically.

use serde::{Deserialize, Serialize};

use crate::store::StoredTensor;

/// Layout family of a foreign tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KerasLayout {
    /// Regular convolution kernel.
    Kernel,

    /// Depthwise convolution kernel.
    DepthwiseKernel,

    /// Dense kernels, biases and normalization vectors.
    Plain,
}

impl KerasLayout {
    /// Converts a foreign tensor to the native layout.
    ///
    /// Tensors whose rank doesn't fit the layout pass through unchanged and
    /// are left for the shape check to reject.
    #[must_use]
    pub fn to_native(&self, tensor: &StoredTensor) -> StoredTensor {
        if tensor.rank() != 4 || !tensor.is_consistent() {
            return tensor.clone();
        }
        match self {
            Self::Kernel => permute(tensor, [3, 2, 0, 1]),
            Self::DepthwiseKernel => {
                let [kh, kw, channels, multiplier] = dims(tensor);
                let mut native = permute(tensor, [2, 3, 0, 1]);
                native.shape = vec![channels * multiplier, 1, kh, kw];
                native
            }
            Self::Plain => tensor.clone(),
        }
    }

    /// Converts a native tensor to the foreign layout.
    ///
    /// Depthwise kernels are written with a channel multiplier of one.
    #[must_use]
    pub fn to_foreign(&self, tensor: &StoredTensor) -> StoredTensor {
        if tensor.rank() != 4 || !tensor.is_consistent() {
            return tensor.clone();
        }
        match self {
            Self::Kernel => permute(tensor, [2, 3, 1, 0]),
            Self::DepthwiseKernel => {
                let [channels, _, kh, kw] = dims(tensor);
                let mut reshaped = tensor.clone();
                reshaped.shape = vec![channels, 1, kh, kw];
                permute(&reshaped, [2, 3, 0, 1])
            }
            Self::Plain => tensor.clone(),
        }
    }
}

fn dims(tensor: &StoredTensor) -> [usize; 4] {
    [tensor.shape[0], tensor.shape[1], tensor.shape[2], tensor.shape[3]]
}

/// Reorders axes so that output axis `d` is input axis `axes[d]`.
fn permute(tensor: &StoredTensor, axes: [usize; 4]) -> StoredTensor {
    let input = dims(tensor);
    let mut strides = [1usize; 4];
    for d in (0..3).rev() {
        strides[d] = strides[d + 1] * input[d + 1];
    }

    let shape: Vec<usize> = axes.iter().map(|&a| input[a]).collect();
    let mut values = Vec::with_capacity(tensor.values.len());
    for i0 in 0..shape[0] {
        for i1 in 0..shape[1] {
            for i2 in 0..shape[2] {
                for i3 in 0..shape[3] {
                    let offset = i0 * strides[axes[0]]
                        + i1 * strides[axes[1]]
                        + i2 * strides[axes[2]]
                        + i3 * strides[axes[3]];
                    values.push(tensor.values[offset]);
                }
            }
        }
    }
    StoredTensor::new(shape, values)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[allow(clippy::cast_precision_loss)]
    fn iota(shape: Vec<usize>) -> StoredTensor {
        let count: usize = shape.iter().product();
        StoredTensor::new(shape, (0..count).map(|v| v as f32).collect())
    }

    #[test]
    fn kernel_hwio_to_oihw() {
        // [kh=1, kw=2, in=2, out=3]
        let foreign = iota(vec![1, 2, 2, 3]);
        let native = KerasLayout::Kernel.to_native(&foreign);
        assert_eq!(native.shape, vec![3, 2, 1, 2]);

        // native[o, i, h, w] == foreign[h, w, i, o]
        let at_foreign =
            |h: usize, w: usize, i: usize, o: usize| foreign.values[((h * 2 + w) * 2 + i) * 3 + o];
        let at_native = |o: usize, i: usize, w: usize| native.values[(o * 2 + i) * 2 + w];
        for o in 0..3 {
            for i in 0..2 {
                for w in 0..2 {
                    assert_relative_eq!(at_native(o, i, w), at_foreign(0, w, i, o));
                }
            }
        }
    }

    #[test]
    fn depthwise_to_native() {
        // [kh=2, kw=2, channels=3, multiplier=1]
        let foreign = iota(vec![2, 2, 3, 1]);
        let native = KerasLayout::DepthwiseKernel.to_native(&foreign);
        assert_eq!(native.shape, vec![3, 1, 2, 2]);
        // channel 1, h=1, w=0 -> foreign index ((1*2+0)*3+1)*1 = 7
        assert_relative_eq!(native.values[4 + 2], 7.0);
    }

    #[test]
    fn depthwise_with_multiplier() {
        let foreign = iota(vec![1, 1, 2, 2]);
        let native = KerasLayout::DepthwiseKernel.to_native(&foreign);
        assert_eq!(native.shape, vec![4, 1, 1, 1]);
        for (value, expected) in native.values.iter().zip([0.0, 1.0, 2.0, 3.0]) {
            assert_relative_eq!(*value, expected);
        }
    }

    #[test]
    fn kernel_round_trip() {
        let native = iota(vec![4, 3, 3, 3]);
        let foreign = KerasLayout::Kernel.to_foreign(&native);
        assert_eq!(foreign.shape, vec![3, 3, 3, 4]);
        assert_eq!(KerasLayout::Kernel.to_native(&foreign), native);
    }

    #[test]
    fn depthwise_round_trip() {
        let native = iota(vec![8, 1, 3, 3]);
        let foreign = KerasLayout::DepthwiseKernel.to_foreign(&native);
        assert_eq!(foreign.shape, vec![3, 3, 8, 1]);
        assert_eq!(KerasLayout::DepthwiseKernel.to_native(&foreign), native);
    }

    #[test]
    fn plain_and_low_rank_pass_through() {
        let dense = iota(vec![5, 2]);
        assert_eq!(KerasLayout::Plain.to_native(&dense), dense);
        assert_eq!(KerasLayout::Kernel.to_native(&dense), dense);

        let vector = iota(vec![7]);
        assert_eq!(KerasLayout::DepthwiseKernel.to_native(&vector), vector);
    }
}
