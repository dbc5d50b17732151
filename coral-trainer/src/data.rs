//! Cached-split loading and per-epoch batch sampling.
//!
//! Dataset caching and preprocessing (image decoding, tokenization, mask
//! padding) happen offline; this module only loads the resulting tensor
//! blobs and slices them into shuffled mini-batches.

use std::path::Path;

use candle_core::{Device, Tensor};
use rand::seq::SliceRandom;
use rand::Rng;

use coral_core::types::Batch;
use coral_core::{CoralError, Result};

/// One cached split: images, caption token ids and attention masks with a
/// shared leading example dimension.
#[derive(Debug, Clone)]
pub struct CachedSplit {
    pub images: Tensor,
    pub captions: Tensor,
    pub masks: Tensor,
}

impl CachedSplit {
    /// Load a split from a safetensors file holding `images`, `captions` and
    /// `masks` tensors.
    pub fn load(path: &Path, device: &Device) -> Result<Self> {
        let mut tensors = candle_core::safetensors::load(path, device)?;
        let mut take = |name: &str| {
            tensors.remove(name).ok_or_else(|| CoralError::ShapeMismatch {
                what: format!("{}", path.display()),
                expected: "tensors `images`, `captions`, `masks`".to_string(),
                actual: format!("`{name}` missing"),
            })
        };
        let split = Self {
            images: take("images")?,
            captions: take("captions")?,
            masks: take("masks")?,
        };
        split.validate()?;
        Ok(split)
    }

    /// Number of examples in the split.
    pub fn len(&self) -> Result<usize> {
        Ok(self.images.dim(0)?)
    }

    pub fn is_empty(&self) -> bool {
        self.len().map(|n| n == 0).unwrap_or(true)
    }

    /// Cross-check the three tensors against each other.
    pub fn validate(&self) -> Result<()> {
        let rows = self.images.dim(0)?;
        for (name, tensor) in [("captions", &self.captions), ("masks", &self.masks)] {
            if tensor.dim(0)? != rows {
                return Err(CoralError::ShapeMismatch {
                    what: format!("split tensor `{name}`"),
                    expected: format!("{rows} examples"),
                    actual: format!("{} examples", tensor.dim(0)?),
                });
            }
        }
        if self.captions.dims() != self.masks.dims() {
            return Err(CoralError::ShapeMismatch {
                what: "attention masks".to_string(),
                expected: format!("{:?}", self.captions.dims()),
                actual: format!("{:?}", self.masks.dims()),
            });
        }
        Ok(())
    }
}

/// Contract between the loop and whatever supplies raw batches. Selected by
/// composition; implementations own their sampling strategy.
pub trait BatchSource {
    fn next_batch(&mut self) -> Option<Result<Batch>>;
}

/// Draws a fresh random permutation of the split per epoch and yields
/// mini-batches without replacement. The final partial batch is kept.
pub struct ShuffledBatches<'a> {
    split: &'a CachedSplit,
    order: Vec<u32>,
    cursor: usize,
    batch_size: usize,
}

impl<'a> ShuffledBatches<'a> {
    pub fn new<R: Rng>(split: &'a CachedSplit, batch_size: usize, rng: &mut R) -> Result<Self> {
        let mut order: Vec<u32> = (0..split.len()? as u32).collect();
        order.shuffle(rng);
        Ok(Self {
            split,
            order,
            cursor: 0,
            batch_size,
        })
    }

    fn slice(&self, indices: &[u32]) -> Result<Batch> {
        let idx = Tensor::new(indices, self.split.images.device())?;
        Ok(Batch {
            images: self.split.images.index_select(&idx, 0)?,
            captions: self.split.captions.index_select(&idx, 0)?,
            masks: self.split.masks.index_select(&idx, 0)?,
        })
    }
}

impl BatchSource for ShuffledBatches<'_> {
    fn next_batch(&mut self) -> Option<Result<Batch>> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.slice(&self.order[self.cursor..end]);
        self.cursor = end;
        Some(batch)
    }
}
