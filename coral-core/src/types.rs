//! Shared data-model types.

use candle_core::Tensor;

use crate::error::Result;

/// One mini-batch of raw inputs: images, caption token ids and attention
/// masks, all with the same leading batch dimension.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `(batch, channels, height, width)` image tensor.
    pub images: Tensor,
    /// `(batch, seq_len)` caption token ids.
    pub captions: Tensor,
    /// `(batch, seq_len)` attention mask, 1 for real tokens and 0 for padding.
    pub masks: Tensor,
}

impl Batch {
    /// Number of examples in this batch.
    pub fn rows(&self) -> Result<usize> {
        Ok(self.images.dim(0)?)
    }
}
