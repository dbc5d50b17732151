//! Coral trainer - cached-tensor data loading, the train/validate loop,
//! metrics, checkpoints and the run-completion notifier.

use candle_core::Device;

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod metrics;
pub mod notify;
pub mod trainer;

pub use config::RunConfig;
pub use data::{BatchSource, CachedSplit, ShuffledBatches};
pub use metrics::{EpochStats, RunSummary};
pub use notify::Notifier;
pub use trainer::{Phase, Trainer};

/// Initialize the trainer module
pub fn init() {
    tracing::info!("coral-trainer initialized");
}

/// Load both splits, run the full epoch loop, write checkpoints and the run
/// summary. Returns the summary for the caller to print or forward.
pub fn run(config: RunConfig) -> anyhow::Result<RunSummary> {
    config.validate()?;

    let device = Device::cuda_if_available(0)?;
    tracing::info!(cuda = device.is_cuda(), "selected device");

    let train = CachedSplit::load(&config.data_dir.join("train.safetensors"), &device)?;
    let val = CachedSplit::load(&config.data_dir.join("val.safetensors"), &device)?;
    tracing::info!(
        "loaded {} train and {} val examples",
        train.len()?,
        val.len()?
    );

    let models_dir = config.models_dir.clone();
    let mut trainer = Trainer::new(config, &device)?;
    let mut rng = rand::thread_rng();
    let summary = trainer.fit(&train, &val, &mut rng)?;

    let tag = summary.final_val_correct.to_string();
    checkpoint::save_pair(trainer.pair(), &models_dir, &tag)?;
    summary.write_json(&models_dir.join("run_summary.json"))?;

    tracing::info!("train losses: {:?}", summary.train_loss);
    tracing::info!("train accs:   {:?}", summary.train_acc);
    tracing::info!("val losses:   {:?}", summary.val_loss);
    tracing::info!("val accs:     {:?}", summary.val_acc);

    Ok(summary)
}
