//! Exponential-moving-average updates for the momentum (teacher) encoder.

use candle_nn::VarMap;

use crate::error::{CoralError, Result};

/// Blend every student parameter into the correspondingly named teacher
/// parameter: `p' := beta * p' + (1 - beta) * p`.
///
/// Values are copied, never differentiated; no gradient flows through this
/// update. The iteration covers the full named-parameter set, and diverging
/// name sets or shapes fail with [`CoralError::ParameterMismatch`].
pub fn ema_update(student: &VarMap, teacher: &VarMap, beta: f64) -> Result<()> {
    let student_vars = student.data().lock().unwrap();
    let teacher_vars = teacher.data().lock().unwrap();

    if student_vars.len() != teacher_vars.len() {
        return Err(CoralError::ParameterMismatch {
            reason: format!(
                "student has {} parameters, teacher has {}",
                student_vars.len(),
                teacher_vars.len()
            ),
        });
    }

    for (name, teacher_var) in teacher_vars.iter() {
        let student_var = student_vars
            .get(name)
            .ok_or_else(|| CoralError::ParameterMismatch {
                reason: format!("parameter `{name}` missing from student"),
            })?;
        if student_var.shape() != teacher_var.shape() {
            return Err(CoralError::ParameterMismatch {
                reason: format!(
                    "parameter `{name}` shapes diverge: student {:?}, teacher {:?}",
                    student_var.shape(),
                    teacher_var.shape()
                ),
            });
        }
        let blended = ((teacher_var.as_tensor() * beta)?
            + (student_var.as_tensor() * (1.0 - beta))?)?;
        teacher_var.set(&blended)?;
    }

    Ok(())
}

/// Carries the configured momentum coefficient through the training loop.
///
/// β close to 1 yields a slowly-changing teacher (EMA window ≈ 1/(1−β) steps).
#[derive(Debug, Clone, Copy)]
pub struct MomentumUpdater {
    beta: f64,
}

impl MomentumUpdater {
    pub fn new(beta: f64) -> Self {
        Self { beta }
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn update(&self, student: &VarMap, teacher: &VarMap) -> Result<()> {
        ema_update(student, teacher, self.beta)
    }
}
