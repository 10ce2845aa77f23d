use ndarray::{Array1, s};
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};

use super::GradientBundle;
use crate::{
    MlErr, Result,
    arch::{CacheKey, Cube, MaskedSoftmax, PrecomputeCache, WeightStore, hidden_layer},
    dataset::Example,
    error::check_shape,
};

/// Computes the gradient of the cost over a fold of a minibatch.
///
/// A worker only borrows the weights and the cache, every buffer it writes into belongs to the
/// `GradientBundle` it returns, so many workers can run at the same time over one snapshot.
#[derive(Debug, Clone)]
pub struct GradientWorker<'a> {
    weights: &'a WeightStore,
    cache: &'a PrecomputeCache,
    batch_size: usize,
    keep: Bernoulli,
}

impl<'a> GradientWorker<'a> {
    /// Creates a new `GradientWorker`.
    ///
    /// # Arguments
    /// * `weights` - The current weights.
    /// * `cache` - Precomputed contributions built from the current `weights`.
    /// * `batch_size` - The size of the whole minibatch, used to normalize the cost.
    /// * `drop_prob` - The probability of dropping each hidden unit of each example.
    ///
    /// # Returns
    /// The worker, or an error if `drop_prob` is outside `[0, 1]`, `batch_size` is zero or the
    /// cache is stale.
    pub fn new(
        weights: &'a WeightStore,
        cache: &'a PrecomputeCache,
        batch_size: usize,
        drop_prob: f64,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(MlErr::EmptyBatch);
        }
        cache.ensure_fresh(weights)?;

        let keep = Bernoulli::new(1.0 - drop_prob)
            .map_err(|_| MlErr::InvalidConfig("drop_prob must be in [0, 1]"))?;

        Ok(Self {
            weights,
            cache,
            batch_size,
            keep,
        })
    }

    /// Runs a dropout-masked forward and backward pass over every example of `examples`.
    ///
    /// The returned bundle holds the cost and accuracy of the fold (already divided by the
    /// minibatch size) and the gradients of every parameter. Gradients that flowed into cached
    /// contributions are also propagated down to `w1` and `e`, so `grad_saved` is informative only.
    /// No regularization is applied.
    ///
    /// # Arguments
    /// * `examples` - The fold to process.
    /// * `rng` - Source of the dropout masks.
    pub fn compute<R: Rng>(&self, examples: &[&Example], rng: &mut R) -> Result<GradientBundle> {
        let weights = self.weights;
        let hidden_size = weights.hidden_size();
        let norm = self.batch_size as f64;
        let w2 = weights.w2();
        let e = weights.e();

        let mut grad = GradientBundle::zeros(weights, self.cache.len());
        let mut touched = vec![false; self.cache.len()];

        for example in examples {
            let feature = example.feature();
            let label = example.label();
            weights.check_feature(feature)?;
            check_shape("label", &[label.len()], &[weights.num_labels()])?;

            let active: Vec<usize> = (0..hidden_size)
                .filter(|_| self.keep.sample(rng))
                .collect();

            let hidden = hidden_layer(weights, self.cache, feature, &active);
            let mut hidden3 = Array1::<f64>::zeros(hidden_size);
            for &j in &active {
                hidden3[j] = Cube.f(hidden[j]);
            }

            let mut scores = Array1::<f64>::zeros(label.len());
            for (i, mark) in label.iter().enumerate() {
                if mark.is_feasible() {
                    scores[i] = active.iter().map(|&j| w2[[i, j]] * hidden3[j]).sum();
                }
            }

            let out = MaskedSoftmax.evaluate(scores.view(), label);
            grad.cost += out.loss / norm;
            if out.correct {
                grad.correct += 1.0 / norm;
            }

            let mut grad_hidden3 = Array1::<f64>::zeros(hidden_size);
            for (i, mark) in label.iter().enumerate() {
                if !mark.is_feasible() {
                    continue;
                }

                let delta = -(mark.target() - out.probs[i]) / norm;
                for &j in &active {
                    grad.w2[[i, j]] += delta * hidden3[j];
                    grad_hidden3[j] += delta * w2[[i, j]];
                }
            }

            let mut grad_hidden = Array1::<f64>::zeros(hidden_size);
            for &j in &active {
                grad_hidden[j] = grad_hidden3[j] * Cube.df(hidden[j]);
                grad.b1[j] += grad_hidden[j];
            }

            for (slot, &row) in feature.iter().enumerate() {
                if let Some(id) = self.cache.index_of(CacheKey::new(row, slot)) {
                    touched[id] = true;
                    let mut saved = grad.saved.row_mut(id);
                    for &j in &active {
                        saved[j] += grad_hidden[j];
                    }
                    continue;
                }

                let offset = slot * weights.embedding_size();
                let span = offset..offset + weights.embedding_size();
                let embedding = e.row(row);
                let block = weights.w1_block(slot);

                for &j in &active {
                    let g = grad_hidden[j];
                    grad.w1
                        .slice_mut(s![j, span.clone()])
                        .scaled_add(g, &embedding);
                    grad.e.row_mut(row).scaled_add(g, &block.row(j));
                }
            }
        }

        self.backprop_saved(&mut grad, &touched);
        Ok(grad)
    }

    /// Propagates the gradient accumulated on each touched cached contribution into the `w1`
    /// block and embedding row that produced it.
    fn backprop_saved(&self, grad: &mut GradientBundle, touched: &[bool]) {
        let weights = self.weights;
        let e = weights.e();

        for (id, key) in self.cache.keys().iter().enumerate() {
            if !touched[id] {
                continue;
            }

            let offset = key.slot * weights.embedding_size();
            let span = offset..offset + weights.embedding_size();
            let embedding = e.row(key.row);
            let block = weights.w1_block(key.slot);

            for j in 0..weights.hidden_size() {
                let delta = grad.saved[[id, j]];
                grad.w1
                    .slice_mut(s![j, span.clone()])
                    .scaled_add(delta, &embedding);
                grad.e.row_mut(key.row).scaled_add(delta, &block.row(j));
            }
        }
    }
}
