//! Momentum-contrastive training and validation loop.
//!
//! Both phases run the same state machine: prime the negative queue from the
//! teacher while it is empty, then alternate loss computation, student
//! gradient steps (train only), teacher momentum updates (train only) and
//! queue refresh. Extractor failures, NaN losses and shape mismatches abort
//! the run.

use candle_core::{Device, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use rand::Rng;

use coral_core::types::Batch;
use coral_core::{
    positive_first_count, BoundedSampleQueue, CoralError, MomentumUpdater, Objective, Result,
};
use coral_encoders::{
    BackboneConfig, FeatureExtractor, Mode, ModelPair, TextBackbone, VisionBackbone,
};

use crate::config::RunConfig;
use crate::data::{BatchSource, CachedSplit, ShuffledBatches};
use crate::metrics::{EpochStats, RunSummary};

/// Gradient-norm bound applied before every optimizer step.
const GRAD_CLIP_NORM: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Validate,
}

impl Phase {
    fn label(&self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Validate => "val",
        }
    }
}

/// Owns the encoder pair, backbones, optimizer and momentum updater for one
/// run.
pub struct Trainer {
    config: RunConfig,
    pair: ModelPair,
    vision: VisionBackbone,
    text: TextBackbone,
    objective: Objective,
    optimizer: AdamW,
    updater: MomentumUpdater,
    trainable: Vec<Var>,
}

impl Trainer {
    pub fn new(config: RunConfig, device: &Device) -> anyhow::Result<Self> {
        let vision = VisionBackbone::new(&config.backbone, device)?;
        let text = TextBackbone::new(&config.backbone, device)?;
        let pair = ModelPair::new(&config.encoder, device)?;

        let mut trainable = pair.student.varmap().all_vars();
        trainable.extend(vision.trainable_vars());
        trainable.extend(text.trainable_vars());

        let optimizer = AdamW::new(
            trainable.clone(),
            ParamsAdamW {
                lr: config.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;
        let updater = MomentumUpdater::new(config.momentum_beta);
        let objective = config.objective;

        Ok(Self {
            config,
            pair,
            vision,
            text,
            objective,
            optimizer,
            updater,
            trainable,
        })
    }

    pub fn pair(&self) -> &ModelPair {
        &self.pair
    }

    /// Run the full epoch loop over both splits. One queue per phase, created
    /// here and persisting across epochs.
    pub fn fit<R: Rng>(
        &mut self,
        train: &CachedSplit,
        val: &CachedSplit,
        rng: &mut R,
    ) -> anyhow::Result<RunSummary> {
        let mut train_queue = BoundedSampleQueue::new();
        let mut val_queue = BoundedSampleQueue::new();
        let mut summary = RunSummary::new();

        for epoch in 0..self.config.epochs {
            let mut batches = ShuffledBatches::new(train, self.config.batch_size, rng)?;
            let stats = self.run_phase(Phase::Train, &mut batches, &mut train_queue, epoch)?;
            log_epoch(Phase::Train, epoch, &stats);
            summary.record_train(&stats);

            let mut batches = ShuffledBatches::new(val, self.config.batch_size, rng)?;
            let stats = self.run_phase(Phase::Validate, &mut batches, &mut val_queue, epoch)?;
            log_epoch(Phase::Validate, epoch, &stats);
            summary.record_val(&stats);
        }

        Ok(summary)
    }

    /// One pass over one split. Priming enqueues a teacher embedding and
    /// skips metrics; steady state computes the loss against the queued
    /// negatives, steps the student (train phase), blends the teacher, and
    /// rotates the queue.
    pub fn run_phase(
        &mut self,
        phase: Phase,
        batches: &mut dyn BatchSource,
        queue: &mut BoundedSampleQueue,
        epoch: usize,
    ) -> anyhow::Result<EpochStats> {
        let mut stats = EpochStats::default();
        let mut step = 0usize;

        while let Some(batch) = batches.next_batch() {
            let batch = batch?;

            if queue.is_empty() {
                self.prime(&batch, queue)?;
                continue;
            }

            let feature_mode = match phase {
                Phase::Train if self.config.backbone.trainable => Mode::Train,
                _ => Mode::Eval,
            };
            let img_features = self.vision.features(&batch, feature_mode)?;
            let txt_features = self.text.features(&batch, feature_mode)?;
            let negatives = queue.get_tensor()?;

            let loss_value = match phase {
                Phase::Train => {
                    let anchor = self.pair.student.forward(&img_features, Mode::Train)?;
                    // the positive never backpropagates into the teacher
                    let positive = self.pair.teacher.forward(&txt_features, Mode::Eval)?;
                    let loss = self.objective.loss(&anchor, &positive, &negatives)?;
                    let value = loss.to_scalar::<f32>()?;
                    check_finite(value, epoch, step)?;

                    let mut grads = loss.backward()?;
                    clip_grad_norm(&self.trainable, &mut grads, GRAD_CLIP_NORM)?;
                    self.optimizer.step(&grads)?;
                    self.updater
                        .update(self.pair.student.varmap(), self.pair.teacher.varmap())?;
                    value
                }
                Phase::Validate => {
                    let anchor = self.pair.student.forward(&img_features, Mode::Eval)?;
                    let positive = self.pair.teacher.forward(&txt_features, Mode::Eval)?;
                    let loss = self.objective.loss(&anchor, &positive, &negatives)?;
                    let value = loss.to_scalar::<f32>()?;
                    check_finite(value, epoch, step)?;
                    value
                }
            };

            // post-update embeddings, detached, for prediction and the queue
            let anchor = self.pair.student.forward(&img_features, Mode::Eval)?;
            let positive = self.pair.teacher.forward(&txt_features, Mode::Eval)?;
            let predictions = self.objective.predict(&anchor, &positive, &negatives)?;
            let correct = positive_first_count(&predictions);
            stats.record(loss_value, correct, predictions.len());

            queue.enqueue(positive)?;
            queue.apply_eviction(self.config.eviction, self.config.batch_size)?;
            step += 1;
        }

        Ok(stats)
    }

    /// Bootstrap the negative pool: no contrastive loss exists with zero
    /// negatives, so the first batch only contributes its teacher embedding.
    fn prime(&self, batch: &Batch, queue: &mut BoundedSampleQueue) -> Result<()> {
        let txt_features = self.text.features(batch, Mode::Eval)?;
        let positive = self.pair.teacher.forward(&txt_features, Mode::Eval)?;
        tracing::debug!(rows = positive.dims()[0], "priming negative queue");
        queue.enqueue(positive)
    }
}

fn check_finite(loss: f32, epoch: usize, step: usize) -> Result<()> {
    if loss.is_finite() {
        Ok(())
    } else {
        Err(CoralError::NumericalInstability { epoch, step, loss })
    }
}

fn log_epoch(phase: Phase, epoch: usize, stats: &EpochStats) {
    if stats.losses.is_empty() {
        tracing::info!("epoch {}: {} produced no steady-state batches", epoch, phase.label());
        return;
    }
    tracing::info!(
        "epoch {}: {} loss = {:.6}, max = {:.6}, min = {:.6}",
        epoch,
        phase.label(),
        stats.mean_loss(),
        stats.max_loss(),
        stats.min_loss()
    );
    tracing::info!(
        "          {} acc = {:.6} ({}/{})",
        phase.label(),
        stats.accuracy(),
        stats.correct,
        stats.total
    );
}

/// Scale all gradients so their global L2 norm stays within `max_norm`,
/// the one proactive mitigation against numerical instability.
fn clip_grad_norm(
    vars: &[Var],
    grads: &mut candle_core::backprop::GradStore,
    max_norm: f64,
) -> Result<()> {
    let mut total = 0.0f64;
    for var in vars {
        if let Some(grad) = grads.get(var) {
            total += grad.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    let norm = total.sqrt();
    if norm > max_norm {
        let scale = max_norm / (norm + 1e-6);
        for var in vars {
            let Some(grad) = grads.get(var).cloned() else {
                continue;
            };
            let scaled = (&grad * scale)?;
            grads.insert(var, scaled);
        }
    }
    Ok(())
}
