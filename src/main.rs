//! coral - momentum-contrastive image/text alignment trainer.
//!
//! Trains a student projection head against a momentum-updated teacher with
//! a sliding queue of negative text embeddings, over cached image/caption
//! tensor splits.
//!
//! ## Usage
//! ```bash
//! # Default run: InfoNCE loss, 10 epochs, batch size 32
//! cargo run --release
//!
//! # Margin ranking loss with the watermark eviction policy
//! cargo run --release -- --loss-function margin --eviction watermark
//!
//! # Longer run with a completion webhook
//! cargo run --release -- --epochs 50 --batch-size 128 --webhook-url https://hooks.example.com/...
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::Level;

use coral_core::{EvictionPolicy, Objective};
use coral_trainer::{Notifier, RunConfig};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "coral")]
#[command(about = "Momentum-contrastive image/text alignment trainer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Number of epochs
    #[arg(long, default_value = "10")]
    epochs: usize,

    /// Batch size
    #[arg(long, default_value = "32")]
    batch_size: usize,

    /// Train the modality backbones alongside the student head
    #[arg(long)]
    train_modality_net: bool,

    /// Which loss function to optimize
    #[arg(long, value_enum, default_value = "contrastive")]
    loss_function: LossKind,

    /// Margin for the ranking loss
    #[arg(long, default_value = "10.0")]
    margin: f64,

    /// Temperature for the contrastive loss
    #[arg(long, default_value = "1.0")]
    temperature: f64,

    /// Student optimizer learning rate
    #[arg(long, default_value = "3e-4")]
    learning_rate: f64,

    /// EMA coefficient for the teacher update
    #[arg(long, default_value = "0.999")]
    momentum: f64,

    /// Queue eviction policy
    #[arg(long, value_enum, default_value = "per-batch")]
    eviction: EvictionKind,

    /// Queue capacity for the watermark policy
    #[arg(long, default_value = "64")]
    queue_capacity: usize,

    /// Vectors evicted per watermark trip
    #[arg(long, default_value = "16")]
    queue_evict: usize,

    /// Directory holding train.safetensors / val.safetensors
    #[arg(long, default_value = "cached_data")]
    data_dir: PathBuf,

    /// Output directory for checkpoints and the run summary
    #[arg(long, default_value = "models")]
    models_dir: PathBuf,

    /// Webhook URL for the run-completion notification
    #[arg(long)]
    webhook_url: Option<String>,

    /// Print debug information
    #[arg(long)]
    verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum LossKind {
    /// Margin ranking loss over each negative
    Margin,
    /// Softmax contrastive loss against the queued negatives
    Contrastive,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum EvictionKind {
    /// Rotate one batch worth of negatives every step
    PerBatch,
    /// Evict a fixed count when the queue reaches capacity
    Watermark,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();

    coral_core::init();
    coral_encoders::init();
    coral_trainer::init();

    tracing::info!("=============================================================");
    tracing::info!("{:?}", args);
    tracing::info!("=============================================================");

    let objective = match args.loss_function {
        LossKind::Margin => Objective::MarginRanking {
            margin: args.margin,
        },
        LossKind::Contrastive => Objective::InfoNce {
            temperature: args.temperature,
        },
    };
    let eviction = match args.eviction {
        EvictionKind::PerBatch => EvictionPolicy::PerBatch,
        EvictionKind::Watermark => EvictionPolicy::Watermark {
            capacity: args.queue_capacity,
            evict: args.queue_evict,
        },
    };

    let config = RunConfig {
        epochs: args.epochs,
        batch_size: args.batch_size,
        learning_rate: args.learning_rate,
        momentum_beta: args.momentum,
        objective,
        eviction,
        backbone: coral_encoders::BackboneConfig {
            trainable: args.train_modality_net,
            ..Default::default()
        },
        data_dir: args.data_dir,
        models_dir: args.models_dir,
        ..Default::default()
    };

    let notifier = Notifier::new(args.webhook_url);
    let summary = coral_trainer::run(config)?;

    if let Err(err) = notifier.notify(&summary) {
        tracing::warn!("webhook notification failed: {err:#}");
    }

    Ok(())
}
