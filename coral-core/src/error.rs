//! Error taxonomy for the contrastive training core.
//!
//! Every variant is unrecoverable at the point of detection: this is an
//! offline batch-training tool, so the policy is fail fast, propagate with
//! `?`, and abort the run with a message naming the violated invariant.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoralError {
    /// The negative pool was queried before it was primed.
    #[error("negative-sample queue is empty; prime the queue before requesting negatives")]
    EmptyQueue,

    /// Student and teacher encoders no longer share a parameter set.
    #[error("student/teacher parameter mismatch: {reason}")]
    ParameterMismatch { reason: String },

    /// Batch tensor dimensions are inconsistent with model expectations.
    #[error("shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    /// The loss degenerated to NaN or infinity.
    #[error("numerical instability at epoch {epoch} step {step}: loss = {loss}")]
    NumericalInstability {
        epoch: usize,
        step: usize,
        loss: f32,
    },

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, CoralError>;
