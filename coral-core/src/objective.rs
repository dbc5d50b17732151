//! Contrastive objectives over (anchor, positive, negatives) embedding triples.

use candle_core::{DType, Tensor, D};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Loss policy, selected at configuration time. Each variant carries its own
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Objective {
    /// Per-negative hinge: `relu(margin - sim(a, p) + sim(a, n))`, averaged
    /// over the negative set.
    MarginRanking { margin: f64 },
    /// Temperature-scaled softmax over `[positive | negatives]` candidate
    /// similarities, cross-entropy against label 0.
    InfoNce { temperature: f64 },
}

impl Objective {
    /// Per-example candidate scores with the positive in column 0 and one
    /// column per queued negative. Cosine similarity throughout, so loss and
    /// prediction rank candidates identically.
    pub fn logits(&self, anchor: &Tensor, positive: &Tensor, negatives: &Tensor) -> Result<Tensor> {
        let anchor = l2_normalize(anchor)?;
        let positive = l2_normalize(positive)?;
        let negatives = l2_normalize(negatives)?;

        // (batch, 1) positive similarity, (batch, negatives) negative block
        let pos = (&anchor * &positive)?.sum_keepdim(D::Minus1)?;
        let neg = anchor.matmul(&negatives.t()?)?;
        Ok(Tensor::cat(&[&pos, &neg], 1)?)
    }

    /// Differentiable loss over the triple. Gradient tracking follows the
    /// inputs: detached embeddings yield a detached loss.
    pub fn loss(&self, anchor: &Tensor, positive: &Tensor, negatives: &Tensor) -> Result<Tensor> {
        let logits = self.logits(anchor, positive, negatives)?;
        let (batch, candidates) = logits.dims2()?;
        match *self {
            Objective::MarginRanking { margin } => {
                let pos = logits.narrow(1, 0, 1)?;
                let neg = logits.narrow(1, 1, candidates - 1)?;
                let hinge = (neg.broadcast_sub(&pos)? + margin)?.relu()?;
                Ok(hinge.mean_all()?)
            }
            Objective::InfoNce { temperature } => {
                let scaled = (logits / temperature)?;
                let targets = Tensor::zeros(batch, DType::U32, scaled.device())?;
                Ok(candle_nn::loss::cross_entropy(&scaled, &targets)?)
            }
        }
    }

    /// Index of the highest-similarity candidate per example, 0 meaning the
    /// positive ranked first.
    pub fn predict(&self, anchor: &Tensor, positive: &Tensor, negatives: &Tensor) -> Result<Vec<u32>> {
        let logits = self.logits(anchor, positive, negatives)?;
        Ok(logits.argmax(D::Minus1)?.to_vec1::<u32>()?)
    }
}

/// Count of examples that ranked the positive first; accuracy is this over
/// the prediction count.
pub fn positive_first_count(predictions: &[u32]) -> usize {
    predictions.iter().filter(|&&p| p == 0).count()
}

fn l2_normalize(t: &Tensor) -> Result<Tensor> {
    let norms = (t.sqr()?.sum_keepdim(D::Minus1)?.sqrt()? + 1e-8)?;
    Ok(t.broadcast_div(&norms)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn rows(data: Vec<Vec<f32>>) -> Tensor {
        let dim = data[0].len();
        let n = data.len();
        let flat: Vec<f32> = data.into_iter().flatten().collect();
        Tensor::from_vec(flat, (n, dim), &Device::Cpu).unwrap()
    }

    #[test]
    fn margin_loss_is_zero_when_every_negative_clears_the_margin() {
        // sim(a, p) = 1, sim(a, n) = 0, margin 0.5: hinge is relu(-0.5) = 0
        let anchor = rows(vec![vec![1.0, 0.0], vec![1.0, 0.0]]);
        let positive = rows(vec![vec![2.0, 0.0], vec![3.0, 0.0]]);
        let negatives = rows(vec![vec![0.0, 1.0], vec![0.0, 5.0]]);

        let objective = Objective::MarginRanking { margin: 0.5 };
        let loss = objective
            .loss(&anchor, &positive, &negatives)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(loss.abs() < 1e-6);
    }

    #[test]
    fn margin_loss_penalizes_close_negatives() {
        let anchor = rows(vec![vec![1.0, 0.0]]);
        let positive = rows(vec![vec![0.0, 1.0]]); // sim(a, p) = 0
        let negatives = rows(vec![vec![1.0, 0.0]]); // sim(a, n) = 1

        let objective = Objective::MarginRanking { margin: 1.0 };
        let loss = objective
            .loss(&anchor, &positive, &negatives)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        // hinge = relu(1 - 0 + 1) = 2
        assert!((loss - 2.0).abs() < 1e-5);
    }

    #[test]
    fn predict_ranks_a_dominant_positive_first() {
        let anchor = rows(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let positive = rows(vec![vec![1.0, 0.1], vec![0.1, 1.0]]);
        let negatives = rows(vec![vec![-1.0, 0.0], vec![0.0, -1.0], vec![-0.5, -0.5]]);

        for objective in [
            Objective::MarginRanking { margin: 1.0 },
            Objective::InfoNce { temperature: 1.0 },
        ] {
            let preds = objective.predict(&anchor, &positive, &negatives).unwrap();
            assert_eq!(preds, vec![0, 0]);
            assert_eq!(positive_first_count(&preds), 2);
        }
    }

    #[test]
    fn predict_points_at_the_best_negative_when_the_positive_loses() {
        let anchor = rows(vec![vec![1.0, 0.0]]);
        let positive = rows(vec![vec![0.0, 1.0]]);
        let negatives = rows(vec![vec![0.5, 0.5], vec![1.0, 0.01]]);

        let objective = Objective::InfoNce { temperature: 1.0 };
        let preds = objective.predict(&anchor, &positive, &negatives).unwrap();
        // candidate 0 is the positive; negatives occupy indices 1..
        assert_eq!(preds, vec![2]);
        assert_eq!(positive_first_count(&preds), 0);
    }

    #[test]
    fn info_nce_loss_shrinks_as_the_positive_dominates() {
        let anchor = rows(vec![vec![1.0, 0.0]]);
        let negatives = rows(vec![vec![0.0, 1.0]]);
        let objective = Objective::InfoNce { temperature: 0.1 };

        let aligned = rows(vec![vec![1.0, 0.0]]);
        let orthogonal = rows(vec![vec![0.0, 1.0]]);

        let good = objective
            .loss(&anchor, &aligned, &negatives)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        let bad = objective
            .loss(&anchor, &orthogonal, &negatives)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(good < bad);
        assert!(good > 0.0);
    }

    #[test]
    fn logits_put_the_positive_in_column_zero() {
        let anchor = rows(vec![vec![1.0, 0.0]]);
        let positive = rows(vec![vec![1.0, 0.0]]);
        let negatives = rows(vec![vec![0.0, 1.0], vec![-1.0, 0.0]]);

        let objective = Objective::InfoNce { temperature: 1.0 };
        let logits = objective.logits(&anchor, &positive, &negatives).unwrap();
        assert_eq!(logits.dims(), &[1, 3]);
        let values = logits.to_vec2::<f32>().unwrap();
        assert!((values[0][0] - 1.0).abs() < 1e-5);
        assert!(values[0][1].abs() < 1e-5);
        assert!((values[0][2] + 1.0).abs() < 1e-5);
    }
}
