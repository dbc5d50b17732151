//! Frozen feature-extractor stand-ins for the pretrained modality backbones.
//!
//! The real system fronts the projection heads with a pretrained CNN and a
//! pretrained text transformer. Those are external collaborators; the loop
//! only needs their contract, which [`FeatureExtractor`] captures: a raw
//! input batch in, a `(batch, feature_dim)` feature matrix out. The two
//! implementations here are deliberately thin candle modules, frozen by
//! default and trainable only when modality-network training is switched on.

use candle_core::{DType, Device, Tensor, Var, D};
use candle_nn::{Conv2d, Conv2dConfig, Embedding, Linear, Module, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};

use coral_core::types::Batch;
use coral_core::Result;

use crate::head::Mode;

/// Maps raw input batches to fixed-size feature vectors.
///
/// Stateless at the inference call boundary; whether internal weights are
/// frozen or trainable is a construction-time property surfaced through
/// [`trainable_vars`](Self::trainable_vars).
pub trait FeatureExtractor {
    fn features(&self, batch: &Batch, mode: Mode) -> Result<Tensor>;

    /// Parameters to hand to the optimizer when modality training is enabled;
    /// empty for frozen backbones.
    fn trainable_vars(&self) -> Vec<Var>;
}

/// Shared configuration for the two backbone stand-ins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackboneConfig {
    /// Width of the produced feature vectors, both modalities.
    pub feature_dim: usize,
    /// Token vocabulary of the text side.
    pub vocab_size: usize,
    /// Width of the token embedding table.
    pub token_width: usize,
    /// Channels produced by the vision stem convolution.
    pub conv_channels: usize,
    /// Train the backbones alongside the student head.
    pub trainable: bool,
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self {
            feature_dim: 2048,
            vocab_size: 30522,
            token_width: 128,
            conv_channels: 64,
            trainable: false,
        }
    }
}

/// Convolutional stem + global average pool + projection, standing in for a
/// pretrained CNN image encoder.
pub struct VisionBackbone {
    stem: Conv2d,
    proj: Linear,
    varmap: VarMap,
    trainable: bool,
}

impl VisionBackbone {
    pub fn new(config: &BackboneConfig, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let stem = candle_nn::conv2d(
            3,
            config.conv_channels,
            7,
            Conv2dConfig {
                stride: 4,
                padding: 3,
                ..Default::default()
            },
            vb.pp("stem"),
        )?;
        let proj = candle_nn::linear(config.conv_channels, config.feature_dim, vb.pp("proj"))?;
        Ok(Self {
            stem,
            proj,
            varmap,
            trainable: config.trainable,
        })
    }
}

impl FeatureExtractor for VisionBackbone {
    fn features(&self, batch: &Batch, mode: Mode) -> Result<Tensor> {
        let images = batch.images.to_dtype(DType::F32)?;
        let x = self.stem.forward(&images)?.relu()?;
        // global average pool over the spatial grid
        let pooled = x.mean(D::Minus1)?.mean(D::Minus1)?;
        let out = self.proj.forward(&pooled)?;
        Ok(if self.trainable && mode == Mode::Train {
            out
        } else {
            out.detach()
        })
    }

    fn trainable_vars(&self) -> Vec<Var> {
        if self.trainable {
            self.varmap.all_vars()
        } else {
            Vec::new()
        }
    }
}

/// Token embedding + mask-weighted mean pool + projection, standing in for a
/// pretrained text transformer.
pub struct TextBackbone {
    embedding: Embedding,
    proj: Linear,
    varmap: VarMap,
    trainable: bool,
}

impl TextBackbone {
    pub fn new(config: &BackboneConfig, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let embedding = candle_nn::embedding(config.vocab_size, config.token_width, vb.pp("tok"))?;
        let proj = candle_nn::linear(config.token_width, config.feature_dim, vb.pp("proj"))?;
        Ok(Self {
            embedding,
            proj,
            varmap,
            trainable: config.trainable,
        })
    }
}

impl FeatureExtractor for TextBackbone {
    fn features(&self, batch: &Batch, mode: Mode) -> Result<Tensor> {
        let ids = batch.captions.to_dtype(DType::U32)?;
        let mask = batch.masks.to_dtype(DType::F32)?;

        let tokens = self.embedding.forward(&ids)?;
        // padding positions contribute nothing to the pooled vector
        let weighted = tokens.broadcast_mul(&mask.unsqueeze(2)?)?;
        let summed = weighted.sum(1)?;
        let counts = (mask.sum_keepdim(1)? + 1e-8)?;
        let pooled = summed.broadcast_div(&counts)?;

        let out = self.proj.forward(&pooled)?;
        Ok(if self.trainable && mode == Mode::Train {
            out
        } else {
            out.detach()
        })
    }

    fn trainable_vars(&self) -> Vec<Var> {
        if self.trainable {
            self.varmap.all_vars()
        } else {
            Vec::new()
        }
    }
}
