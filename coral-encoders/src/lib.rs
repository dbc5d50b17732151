//! Coral encoders - projection heads and feature-extractor contracts.
//!
//! The student/teacher projection heads are the trainable part of the
//! pipeline; the modality backbones are frozen stand-ins for the external
//! pretrained extractors.

pub mod backbone;
pub mod head;

pub use backbone::*;
pub use head::*;

/// Initialize the encoders module
pub fn init() {
    tracing::info!("coral-encoders initialized");
}
