//! End-to-end loop tests over tiny synthetic splits.

use candle_core::{DType, Device, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

use coral_core::{EvictionPolicy, Objective};
use coral_encoders::{BackboneConfig, EncoderConfig};
use coral_trainer::{checkpoint, CachedSplit, RunConfig, Trainer};

fn tiny_config(objective: Objective) -> RunConfig {
    RunConfig {
        epochs: 2,
        batch_size: 4,
        learning_rate: 1e-3,
        momentum_beta: 0.99,
        objective,
        eviction: EvictionPolicy::PerBatch,
        encoder: EncoderConfig {
            feature_dim: 16,
            hidden_dim: 32,
            embed_dim: 8,
        },
        backbone: BackboneConfig {
            feature_dim: 16,
            vocab_size: 64,
            token_width: 8,
            conv_channels: 4,
            trainable: false,
        },
        ..Default::default()
    }
}

fn synthetic_split(rows: usize, seq_len: usize, device: &Device) -> CachedSplit {
    let captions: Vec<u32> = (0..rows * seq_len).map(|i| (i % 63) as u32 + 1).collect();
    let mut masks = vec![1f32; rows * seq_len];
    // give some rows a padded tail
    for row in 0..rows {
        if row % 3 == 0 {
            masks[row * seq_len + seq_len - 1] = 0.0;
        }
    }
    CachedSplit {
        images: Tensor::randn(0.0f32, 1.0, (rows, 3, 8, 8), device).unwrap(),
        captions: Tensor::from_vec(captions, (rows, seq_len), device).unwrap(),
        masks: Tensor::from_vec(masks, (rows, seq_len), device).unwrap(),
    }
}

#[test]
fn fit_produces_per_epoch_sequences_for_both_phases() {
    let device = Device::Cpu;
    let config = tiny_config(Objective::InfoNce { temperature: 1.0 });
    let mut trainer = Trainer::new(config, &device).unwrap();

    let train = synthetic_split(12, 6, &device);
    let val = synthetic_split(8, 6, &device);
    let mut rng = StdRng::seed_from_u64(11);

    let summary = trainer.fit(&train, &val, &mut rng).unwrap();
    assert_eq!(summary.train_loss.len(), 2);
    assert_eq!(summary.train_acc.len(), 2);
    assert_eq!(summary.val_loss.len(), 2);
    assert_eq!(summary.val_acc.len(), 2);
    for loss in summary.train_loss.iter().chain(summary.val_loss.iter()) {
        assert!(loss.is_finite());
    }
    for acc in summary.train_acc.iter().chain(summary.val_acc.iter()) {
        assert!((0.0..=1.0).contains(acc));
    }
}

#[test]
fn margin_objective_trains_end_to_end() {
    let device = Device::Cpu;
    let config = tiny_config(Objective::MarginRanking { margin: 1.0 });
    let mut trainer = Trainer::new(config, &device).unwrap();

    let train = synthetic_split(8, 5, &device);
    let val = synthetic_split(8, 5, &device);
    let mut rng = StdRng::seed_from_u64(23);

    let summary = trainer.fit(&train, &val, &mut rng).unwrap();
    assert_eq!(summary.train_loss.len(), 2);
    assert!(summary.train_loss.iter().all(|l| l.is_finite() && *l >= 0.0));
}

#[test]
fn checkpoints_and_summary_land_in_the_output_directory() {
    let device = Device::Cpu;
    let config = tiny_config(Objective::InfoNce { temperature: 1.0 });
    let mut trainer = Trainer::new(config, &device).unwrap();

    let train = synthetic_split(8, 5, &device);
    let val = synthetic_split(8, 5, &device);
    let mut rng = StdRng::seed_from_u64(31);
    let summary = trainer.fit(&train, &val, &mut rng).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let tag = summary.final_val_correct.to_string();
    let (student, teacher) = checkpoint::save_pair(trainer.pair(), dir.path(), &tag).unwrap();
    assert!(student.exists());
    assert!(teacher.exists());

    let summary_path = dir.path().join("run_summary.json");
    summary.write_json(&summary_path).unwrap();
    let raw = std::fs::read_to_string(&summary_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(parsed["train_loss"].is_array());
    assert!(parsed["val_acc"].is_array());
}

#[test]
fn trainable_backbones_still_converge_through_one_epoch() {
    let device = Device::Cpu;
    let mut config = tiny_config(Objective::InfoNce { temperature: 1.0 });
    config.epochs = 1;
    config.backbone.trainable = true;
    let mut trainer = Trainer::new(config, &device).unwrap();

    let train = synthetic_split(12, 5, &device);
    let val = synthetic_split(8, 5, &device);
    let mut rng = StdRng::seed_from_u64(47);

    let summary = trainer.fit(&train, &val, &mut rng).unwrap();
    assert_eq!(summary.train_loss.len(), 1);
    assert!(summary.train_loss[0].is_finite());
}

#[test]
fn split_loading_round_trips_through_safetensors() {
    let device = Device::Cpu;
    let split = synthetic_split(6, 4, &device);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("train.safetensors");
    let tensors = std::collections::HashMap::from([
        ("images".to_string(), split.images.clone()),
        ("captions".to_string(), split.captions.clone()),
        ("masks".to_string(), split.masks.clone()),
    ]);
    candle_core::safetensors::save(&tensors, &path).unwrap();

    let loaded = CachedSplit::load(&path, &device).unwrap();
    assert_eq!(loaded.len().unwrap(), 6);
    assert_eq!(loaded.captions.dims(), &[6, 4]);
    assert_eq!(loaded.masks.dtype(), DType::F32);
}
