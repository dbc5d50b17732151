//! Run configuration assembled by the CLI and threaded through the loop.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use coral_core::{EvictionPolicy, Objective};
use coral_encoders::{BackboneConfig, EncoderConfig};

/// Everything one training run needs, built once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Student optimizer learning rate.
    pub learning_rate: f64,
    /// EMA coefficient for the teacher update, in (0, 1).
    pub momentum_beta: f64,
    pub objective: Objective,
    pub eviction: EvictionPolicy,
    pub encoder: EncoderConfig,
    pub backbone: BackboneConfig,
    /// Directory holding `train.safetensors` and `val.safetensors`.
    pub data_dir: PathBuf,
    /// Output directory for checkpoints and the run summary.
    pub models_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            learning_rate: 3e-4,
            momentum_beta: 0.999,
            objective: Objective::InfoNce { temperature: 1.0 },
            eviction: EvictionPolicy::default(),
            encoder: EncoderConfig::default(),
            backbone: BackboneConfig::default(),
            data_dir: PathBuf::from("cached_data"),
            models_dir: PathBuf::from("models"),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.epochs > 0, "epochs must be positive");
        anyhow::ensure!(self.batch_size > 0, "batch size must be positive");
        anyhow::ensure!(
            self.learning_rate > 0.0,
            "learning rate must be positive, got {}",
            self.learning_rate
        );
        anyhow::ensure!(
            self.momentum_beta > 0.0 && self.momentum_beta < 1.0,
            "momentum beta must lie in (0, 1), got {}",
            self.momentum_beta
        );
        if let EvictionPolicy::Watermark { capacity, evict } = self.eviction {
            anyhow::ensure!(
                capacity > 0 && evict > 0,
                "watermark eviction needs positive capacity and evict counts"
            );
        }
        Ok(())
    }
}
