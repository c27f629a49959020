//! Epoch ordering and batch collation.

use burn::prelude::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::error::{DatasetError, Result};
use crate::sample::LoadedSample;

/// A collated batch.
#[derive(Debug, Clone)]
pub struct SampleBatch<B: Backend> {
    /// Images `[N, 3, S, S]`.
    pub images: Tensor<B, 4>,

    /// Labels `[N]`.
    pub labels: Tensor<B, 1, Int>,
}

/// Stacks decoded samples into a batch.
///
/// # Errors
///
/// Returns `DatasetError::EmptyDataset` for an empty slice and
/// `DatasetError::InvalidConfig` if a sample is not `3 * size * size` long.
pub fn collate<B: Backend>(samples: &[LoadedSample], size: usize, device: &B::Device) -> Result<SampleBatch<B>> {
    if samples.is_empty() {
        return Err(DatasetError::empty_dataset("batch"));
    }
    let per_image = 3 * size * size;
    let mut pixels = Vec::with_capacity(samples.len() * per_image);
    let mut labels = Vec::with_capacity(samples.len());
    for sample in samples {
        if sample.pixels.len() != per_image {
            return Err(DatasetError::invalid_config(format!(
                "sample has {} values, expected {per_image}",
                sample.pixels.len()
            )));
        }
        pixels.extend_from_slice(&sample.pixels);
        #[allow(clippy::cast_possible_wrap)]
        labels.push(sample.label as i64);
    }

    let count = samples.len();
    Ok(SampleBatch {
        images: Tensor::from_data(TensorData::new(pixels, [count, 3, size, size]), device),
        labels: Tensor::from_data(TensorData::new(labels, [count]), device),
    })
}

/// Splits `0..len` into consecutive batches, keeping a short tail.
///
/// # Errors
///
/// Returns `DatasetError::InvalidBatchSize` for a batch size of zero.
pub fn sequential_batches(len: usize, batch_size: usize) -> Result<Vec<Vec<usize>>> {
    if batch_size == 0 {
        return Err(DatasetError::InvalidBatchSize(batch_size));
    }
    let indices: Vec<usize> = (0..len).collect();
    Ok(indices.chunks(batch_size).map(<[usize]>::to_vec).collect())
}

/// Endless sequence of shuffled training epochs.
///
/// Each epoch is a fresh permutation of `0..len` cut into full batches; a
/// short tail is dropped. The permutation stream is fixed by the seed.
///
/// # Example
///
/// ```
/// use ml_dataset::TrainingEpochs;
///
/// let mut epochs = TrainingEpochs::new(10, 4, 7).unwrap();
/// let first = epochs.next().unwrap();
/// assert_eq!(first.len(), 2);
/// assert!(first.iter().all(|batch| batch.len() == 4));
/// ```
#[derive(Debug, Clone)]
pub struct TrainingEpochs {
    len: usize,
    batch_size: usize,
    rng: ChaCha8Rng,
}

impl TrainingEpochs {
    /// Creates the epoch sequence.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::InvalidBatchSize` for a batch size of zero.
    pub fn new(len: usize, batch_size: usize, seed: u64) -> Result<Self> {
        if batch_size == 0 {
            return Err(DatasetError::InvalidBatchSize(batch_size));
        }
        Ok(Self {
            len,
            batch_size,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// Number of batches per epoch.
    #[must_use]
    pub const fn batches_per_epoch(&self) -> usize {
        self.len / self.batch_size
    }
}

impl Iterator for TrainingEpochs {
    type Item = Vec<Vec<usize>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut order: Vec<usize> = (0..self.len).collect();
        order.shuffle(&mut self.rng);
        Some(
            order
                .chunks_exact(self.batch_size)
                .map(<[usize]>::to_vec)
                .collect(),
        )
    }
}
