use ndarray::{Array, Array1, Array2, ArrayView, ArrayView1, ArrayView2, Dimension, Zip};

use crate::{MlErr, Result, arch::WeightStore, error::check_shape};

/// The cost and weight gradients of the network over some examples.
///
/// Bundles are created zeroed by each gradient worker, filled privately, and then merged on the
/// training coordinator. Merging is an elementwise sum, so it's associative and commutative.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBundle {
    pub(crate) cost: f64,
    pub(crate) correct: f64,

    pub(crate) w1: Array2<f64>,
    pub(crate) b1: Array1<f64>,
    pub(crate) w2: Array2<f64>,
    pub(crate) e: Array2<f64>,
    /// Gradient with respect to the precomputed contributions of a cache.
    pub(crate) saved: Array2<f64>,
}

impl GradientBundle {
    /// Creates a zeroed bundle shaped after `weights` and a cache with `cached` keys.
    pub fn zeros(weights: &WeightStore, cached: usize) -> Self {
        Self {
            cost: 0.0,
            correct: 0.0,
            w1: Array2::zeros(weights.w1().raw_dim()),
            b1: Array1::zeros(weights.b1().raw_dim()),
            w2: Array2::zeros(weights.w2().raw_dim()),
            e: Array2::zeros(weights.e().raw_dim()),
            saved: Array2::zeros((cached, weights.hidden_size())),
        }
    }

    /// Adds every buffer and scalar of `other` into this bundle.
    ///
    /// # Returns
    /// A `ShapeMismatch` if the bundles weren't shaped after the same weights and cache, in
    /// which case `self` is left untouched.
    pub fn merge(&mut self, other: &GradientBundle) -> Result<()> {
        check_shape("merged w1", other.w1.shape(), self.w1.shape())?;
        check_shape("merged b1", other.b1.shape(), self.b1.shape())?;
        check_shape("merged w2", other.w2.shape(), self.w2.shape())?;
        check_shape("merged e", other.e.shape(), self.e.shape())?;
        check_shape("merged saved", other.saved.shape(), self.saved.shape())?;

        self.cost += other.cost;
        self.correct += other.correct;
        self.w1 += &other.w1;
        self.b1 += &other.b1;
        self.w2 += &other.w2;
        self.e += &other.e;
        self.saved += &other.saved;

        Ok(())
    }

    /// Folds `bundles` into a single one.
    ///
    /// # Returns
    /// The merged bundle, `EmptyBatch` if there are no bundles, or a `ShapeMismatch`.
    pub fn aggregate<I>(bundles: I) -> Result<Self>
    where
        I: IntoIterator<Item = GradientBundle>,
    {
        let mut bundles = bundles.into_iter();
        let mut total = bundles.next().ok_or(MlErr::EmptyBatch)?;

        for bundle in bundles {
            total.merge(&bundle)?;
        }

        Ok(total)
    }

    /// Adds the L2 penalty `reg * p^2 / 2` of every parameter of `weights` to the cost and
    /// `reg * p` to the gradients.
    ///
    /// # Arguments
    /// * `weights` - The parameters being regularized.
    /// * `reg` - The regularization coefficient.
    pub fn add_l2(&mut self, weights: &WeightStore, reg: f64) -> Result<()> {
        check_shape("l2 w1", weights.w1().shape(), self.w1.shape())?;
        check_shape("l2 b1", weights.b1().shape(), self.b1.shape())?;
        check_shape("l2 w2", weights.w2().shape(), self.w2.shape())?;
        check_shape("l2 e", weights.e().shape(), self.e.shape())?;

        let mut penalty = 0.0;
        penalty += regularize(&mut self.w1, weights.w1(), reg);
        penalty += regularize(&mut self.b1, weights.b1(), reg);
        penalty += regularize(&mut self.w2, weights.w2(), reg);
        penalty += regularize(&mut self.e, weights.e(), reg);
        self.cost += penalty;

        Ok(())
    }

    /// The minibatch cost.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// The fraction of examples whose best feasible label is gold.
    pub fn accuracy(&self) -> f64 {
        self.correct
    }

    pub fn grad_w1(&self) -> ArrayView2<'_, f64> {
        self.w1.view()
    }

    pub fn grad_b1(&self) -> ArrayView1<'_, f64> {
        self.b1.view()
    }

    pub fn grad_w2(&self) -> ArrayView2<'_, f64> {
        self.w2.view()
    }

    pub fn grad_e(&self) -> ArrayView2<'_, f64> {
        self.e.view()
    }

    pub fn grad_saved(&self) -> ArrayView2<'_, f64> {
        self.saved.view()
    }
}

fn regularize<D: Dimension>(grad: &mut Array<f64, D>, params: ArrayView<f64, D>, reg: f64) -> f64 {
    let mut penalty = 0.0;
    Zip::from(grad).and(&params).for_each(|g, &p| {
        penalty += reg * p * p / 2.0;
        *g += reg * p;
    });
    penalty
}
