//! Trainable projection heads for the student/teacher encoder pair.

use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};

use coral_core::Result;

/// Whether a forward pass participates in gradient bookkeeping.
///
/// Threaded explicitly through every encoder call instead of relying on an
/// ambient gradient context; `Eval` detaches outputs from the autograd graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Projection head architecture shared by student and teacher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Width of the backbone feature vectors fed into the head.
    pub feature_dim: usize,
    /// Width of the two hidden layers.
    pub hidden_dim: usize,
    /// Width of the produced embedding.
    pub embed_dim: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            feature_dim: 2048,
            hidden_dim: 4096,
            embed_dim: 128,
        }
    }
}

/// Three-layer MLP mapping backbone features to the shared embedding space.
pub struct ProjectionHead {
    fc1: Linear,
    fc2: Linear,
    fc3: Linear,
    varmap: VarMap,
}

impl ProjectionHead {
    pub fn new(config: &EncoderConfig, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let fc1 = candle_nn::linear(config.feature_dim, config.hidden_dim, vb.pp("fc1"))?;
        let fc2 = candle_nn::linear(config.hidden_dim, config.hidden_dim, vb.pp("fc2"))?;
        let fc3 = candle_nn::linear(config.hidden_dim, config.embed_dim, vb.pp("fc3"))?;
        Ok(Self {
            fc1,
            fc2,
            fc3,
            varmap,
        })
    }

    /// Map `(batch, feature_dim)` features to `(batch, embed_dim)` embeddings.
    pub fn forward(&self, features: &Tensor, mode: Mode) -> Result<Tensor> {
        let x = self.fc1.forward(features)?.relu()?;
        let x = self.fc2.forward(&x)?.relu()?;
        let out = self.fc3.forward(&x)?;
        Ok(match mode {
            Mode::Train => out,
            Mode::Eval => out.detach(),
        })
    }

    /// Named parameters of this head, for the optimizer and momentum updates.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }
}

/// Student/teacher pair built from one architecture, so their named-parameter
/// sets and shapes are structurally identical for the whole run.
pub struct ModelPair {
    pub student: ProjectionHead,
    pub teacher: ProjectionHead,
}

impl ModelPair {
    pub fn new(config: &EncoderConfig, device: &Device) -> Result<Self> {
        Ok(Self {
            student: ProjectionHead::new(config, device)?,
            teacher: ProjectionHead::new(config, device)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> EncoderConfig {
        EncoderConfig {
            feature_dim: 8,
            hidden_dim: 16,
            embed_dim: 4,
        }
    }

    #[test]
    fn forward_produces_embed_dim_outputs() {
        let device = Device::Cpu;
        let head = ProjectionHead::new(&tiny_config(), &device).unwrap();
        let features = Tensor::randn(0.0f32, 1.0, (3, 8), &device).unwrap();

        let out = head.forward(&features, Mode::Train).unwrap();
        assert_eq!(out.dims(), &[3, 4]);
    }

    #[test]
    fn pair_shares_a_parameter_set() {
        let device = Device::Cpu;
        let pair = ModelPair::new(&tiny_config(), &device).unwrap();

        let student = pair.student.varmap().data().lock().unwrap();
        let teacher = pair.teacher.varmap().data().lock().unwrap();
        assert_eq!(student.len(), teacher.len());
        for (name, var) in student.iter() {
            let twin = teacher.get(name).expect("missing twin parameter");
            assert_eq!(var.shape(), twin.shape());
            assert_eq!(var.dtype(), twin.dtype());
        }
    }

    #[test]
    fn eval_mode_detaches_the_output() {
        let device = Device::Cpu;
        let head = ProjectionHead::new(&tiny_config(), &device).unwrap();
        let features = Tensor::randn(0.0f32, 1.0, (2, 8), &device).unwrap();

        let out = head.forward(&features, Mode::Eval).unwrap();
        let loss = out.sqr().unwrap().mean_all().unwrap();
        let grads = loss.backward().unwrap();
        for var in head.varmap().all_vars() {
            assert!(grads.get(&var).is_none());
        }
    }
}
