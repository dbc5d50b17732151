//! Per-epoch metric accumulation and the run summary.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Accumulated loss and prediction counts for one phase of one epoch.
/// Reset at every phase start, reduced once, then discarded.
#[derive(Debug, Default)]
pub struct EpochStats {
    pub losses: Vec<f32>,
    pub correct: usize,
    pub total: usize,
}

impl EpochStats {
    pub fn record(&mut self, loss: f32, correct: usize, total: usize) {
        self.losses.push(loss);
        self.correct += correct;
        self.total += total;
    }

    pub fn mean_loss(&self) -> f32 {
        if self.losses.is_empty() {
            return 0.0;
        }
        self.losses.iter().sum::<f32>() / self.losses.len() as f32
    }

    pub fn max_loss(&self) -> f32 {
        self.losses.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn min_loss(&self) -> f32 {
        self.losses.iter().copied().fold(f32::INFINITY, f32::min)
    }

    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f32 / self.total as f32
    }
}

/// Per-epoch train/validation sequences, serialized once at run completion.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub train_loss: Vec<f32>,
    pub train_acc: Vec<f32>,
    pub val_loss: Vec<f32>,
    pub val_acc: Vec<f32>,
    /// Correct-prediction count of the final validation epoch; tags the
    /// checkpoint filenames.
    pub final_val_correct: usize,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            train_loss: Vec::new(),
            train_acc: Vec::new(),
            val_loss: Vec::new(),
            val_acc: Vec::new(),
            final_val_correct: 0,
        }
    }

    pub fn record_train(&mut self, stats: &EpochStats) {
        self.train_loss.push(stats.mean_loss());
        self.train_acc.push(stats.accuracy());
    }

    pub fn record_val(&mut self, stats: &EpochStats) {
        self.val_loss.push(stats.mean_loss());
        self.val_acc.push(stats.accuracy());
        self.final_val_correct = stats.correct;
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}
