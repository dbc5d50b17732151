//! End-of-run encoder checkpoints.

use std::path::{Path, PathBuf};

use anyhow::Context;

use coral_encoders::ModelPair;

/// Persist both encoders as safetensors, filenames tagged with the
/// run-identifying metric. Written once, after the last epoch.
pub fn save_pair(pair: &ModelPair, dir: &Path, tag: &str) -> anyhow::Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating checkpoint directory {}", dir.display()))?;

    let student_path = dir.join(format!("enc1-{tag}-norm.safetensors"));
    let teacher_path = dir.join(format!("enc2-{tag}-norm.safetensors"));
    pair.student
        .varmap()
        .save(&student_path)
        .with_context(|| format!("writing {}", student_path.display()))?;
    pair.teacher
        .varmap()
        .save(&teacher_path)
        .with_context(|| format!("writing {}", teacher_path.display()))?;

    tracing::info!(
        "saved checkpoints {} and {}",
        student_path.display(),
        teacher_path.display()
    );
    Ok((student_path, teacher_path))
}
