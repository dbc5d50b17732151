//! Coral core - negative-sample queue, momentum updates and contrastive
//! objectives.
//!
//! This crate holds the pieces of the training pipeline that do not know
//! about datasets or encoders: the sliding FIFO pool of negative embeddings,
//! the exponential-moving-average parameter blend for the momentum encoder,
//! and the two contrastive loss policies.

pub mod error;
pub mod momentum;
pub mod objective;
pub mod queue;
pub mod types;

pub use error::*;
pub use momentum::*;
pub use objective::*;
pub use queue::*;
pub use types::*;

/// Initialize the core module
pub fn init() {
    tracing::info!("coral-core initialized");
}
