use ndarray::{Array1, ArrayView1};

use crate::dataset::Mark;

/// The outcome of evaluating the masked softmax over one example's scores.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftmaxOutput {
    /// `log sum_feasible exp(score) - log sum_gold exp(score)`, not yet divided by the batch size.
    pub loss: f64,
    /// Whether the highest scoring feasible label is gold.
    pub correct: bool,
    /// Softmax probabilities over the feasible labels, zero for the infeasible ones.
    pub probs: Array1<f64>,
}

/// Multi-label softmax cross entropy restricted to the feasible labels.
///
/// Infeasible labels take no part in the normalization, the loss or the argmax. Scores are
/// shifted by the feasible maximum before exponentiation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskedSoftmax;

impl MaskedSoftmax {
    /// Evaluates the loss of `scores` against `label`.
    ///
    /// `label` must contain at least one gold (hence feasible) mark, which every `Example`
    /// guarantees.
    pub fn evaluate(&self, scores: ArrayView1<f64>, label: &[Mark]) -> SoftmaxOutput {
        let mut best: Option<usize> = None;
        for (i, mark) in label.iter().enumerate() {
            if mark.is_feasible() && best.is_none_or(|b| scores[i] > scores[b]) {
                best = Some(i);
            }
        }

        let Some(best) = best else {
            return SoftmaxOutput {
                loss: 0.0,
                correct: false,
                probs: Array1::zeros(label.len()),
            };
        };

        let max_score = scores[best];
        let mut probs = Array1::zeros(label.len());
        let mut sum_feasible = 0.0;
        let mut sum_gold = 0.0;

        for (i, mark) in label.iter().enumerate() {
            if mark.is_feasible() {
                let exp = (scores[i] - max_score).exp();
                probs[i] = exp;
                sum_feasible += exp;
                if mark.is_gold() {
                    sum_gold += exp;
                }
            }
        }

        probs /= sum_feasible;

        SoftmaxOutput {
            loss: sum_feasible.ln() - sum_gold.ln(),
            correct: label[best].is_gold(),
            probs,
        }
    }
}
