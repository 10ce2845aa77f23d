use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::{Array, Array1, Array2, ArrayView1, ArrayView2, Dimension, s};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::{
    MlErr, Result, config::Config, error::check_shape, optimization::Optimizer,
    training::GradientBundle,
};

/// The parameters of the network plus the accumulated squared gradients of each of them.
///
/// Shapes:
/// * `e`: `vocab_size x embedding_size`
/// * `w1`: `hidden_size x (num_tokens * embedding_size)`
/// * `b1`: `hidden_size`
/// * `w2`: `num_labels x hidden_size`
///
/// The store is only ever mutated through [`WeightStore::apply`], which bumps its generation and
/// draws a new process-unique version, so that precomputed activations built from other weights
/// can be told apart.
#[derive(Debug, Clone)]
pub struct WeightStore {
    e: Array2<f64>,
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,

    // Squared gradient histories
    eg2_e: Array2<f64>,
    eg2_w1: Array2<f64>,
    eg2_b1: Array1<f64>,
    eg2_w2: Array2<f64>,

    generation: u64,
    version: u64,
}

static NEXT_VERSION: AtomicU64 = AtomicU64::new(0);

fn next_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

impl WeightStore {
    /// Creates a new `WeightStore` out of initial (or loaded) parameters.
    ///
    /// # Arguments
    /// * `e` - The token embedding table.
    /// * `w1` - The first layer weights.
    /// * `b1` - The first layer bias.
    /// * `w2` - The second layer weights.
    ///
    /// # Returns
    /// The store, or a `ShapeMismatch` if the matrices don't fit together.
    pub fn new(e: Array2<f64>, w1: Array2<f64>, b1: Array1<f64>, w2: Array2<f64>) -> Result<Self> {
        let embedding_size = e.ncols();
        let hidden_size = w1.nrows();

        if embedding_size == 0 || w1.ncols() % embedding_size != 0 || w1.ncols() == 0 {
            return Err(MlErr::shape(
                "w1 columns",
                &[w1.ncols()],
                &[embedding_size.max(1)],
            ));
        }
        check_shape("b1", b1.shape(), &[hidden_size])?;
        check_shape("w2 columns", &[w2.ncols()], &[hidden_size])?;

        Ok(Self {
            eg2_e: Array2::zeros(e.raw_dim()),
            eg2_w1: Array2::zeros(w1.raw_dim()),
            eg2_b1: Array1::zeros(b1.raw_dim()),
            eg2_w2: Array2::zeros(w2.raw_dim()),
            e: standard_layout(e),
            w1: standard_layout(w1),
            b1: standard_layout(b1),
            w2: standard_layout(w2),
            generation: 0,
            version: next_version(),
        })
    }

    /// Creates a new `WeightStore` with every parameter drawn uniformly from
    /// `[-init_range, init_range]`.
    ///
    /// # Arguments
    /// * `config` - Provides the layer sizes and `init_range`.
    /// * `vocab_size` - The amount of rows in the embedding table.
    /// * `num_labels` - The amount of output transitions.
    /// * `rng` - A random number generator.
    pub fn random<R: Rng>(
        config: &Config,
        vocab_size: usize,
        num_labels: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let range = config.init_range;
        let dist = Uniform::new_inclusive(-range, range)
            .map_err(|_| MlErr::InvalidConfig("init_range must be finite and non negative"))?;
        let mut sample = |shape: (usize, usize)| {
            Array2::from_shape_simple_fn(shape, || dist.sample(&mut *rng))
        };

        let w1 = sample((config.hidden_size, config.input_size()));
        let w2 = sample((num_labels, config.hidden_size));
        let e = sample((vocab_size, config.embedding_size));
        let b1 = Array1::from_shape_simple_fn(config.hidden_size, || dist.sample(&mut *rng));

        Self::new(e, w1, b1, w2)
    }

    pub fn vocab_size(&self) -> usize {
        self.e.nrows()
    }

    pub fn embedding_size(&self) -> usize {
        self.e.ncols()
    }

    pub fn hidden_size(&self) -> usize {
        self.w1.nrows()
    }

    pub fn num_tokens(&self) -> usize {
        self.w1.ncols() / self.embedding_size()
    }

    pub fn num_labels(&self) -> usize {
        self.w2.nrows()
    }

    /// The amount of optimizer steps applied so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Identifies the current parameter values. Two stores share a version only if one is an
    /// unmodified clone of the other.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn e(&self) -> ArrayView2<'_, f64> {
        self.e.view()
    }

    pub fn w1(&self) -> ArrayView2<'_, f64> {
        self.w1.view()
    }

    pub fn b1(&self) -> ArrayView1<'_, f64> {
        self.b1.view()
    }

    pub fn w2(&self) -> ArrayView2<'_, f64> {
        self.w2.view()
    }

    pub fn eg2_e(&self) -> ArrayView2<'_, f64> {
        self.eg2_e.view()
    }

    pub fn eg2_w1(&self) -> ArrayView2<'_, f64> {
        self.eg2_w1.view()
    }

    pub fn eg2_b1(&self) -> ArrayView1<'_, f64> {
        self.eg2_b1.view()
    }

    pub fn eg2_w2(&self) -> ArrayView2<'_, f64> {
        self.eg2_w2.view()
    }

    /// Returns the block of `w1` that connects token slot `slot` to the hidden layer, that is,
    /// a `hidden_size x embedding_size` view.
    pub fn w1_block(&self, slot: usize) -> ArrayView2<'_, f64> {
        let offset = slot * self.embedding_size();
        self.w1.slice(s![.., offset..offset + self.embedding_size()])
    }

    /// Checks `feature` has one in-range embedding row per token slot.
    ///
    /// # Returns
    /// A `ShapeMismatch` describing the first violation.
    pub fn check_feature(&self, feature: &[usize]) -> Result<()> {
        check_shape("feature", &[feature.len()], &[self.num_tokens()])?;

        match feature.iter().find(|&&row| row >= self.vocab_size()) {
            Some(&row) => Err(MlErr::shape(
                "embedding row",
                &[row],
                &[self.vocab_size()],
            )),
            None => Ok(()),
        }
    }

    /// Applies `optimizer` to every parameter matrix with the matching gradient of `grad`.
    ///
    /// All shapes are checked before any parameter is touched, so a failed call leaves the
    /// store unchanged.
    ///
    /// # Arguments
    /// * `optimizer` - The update rule.
    /// * `grad` - The aggregated gradient of a minibatch.
    pub fn apply<O: Optimizer>(&mut self, optimizer: &mut O, grad: &GradientBundle) -> Result<()> {
        check_shape("grad w1", grad.w1.shape(), self.w1.shape())?;
        check_shape("grad b1", grad.b1.shape(), self.b1.shape())?;
        check_shape("grad w2", grad.w2.shape(), self.w2.shape())?;
        check_shape("grad e", grad.e.shape(), self.e.shape())?;

        self.version = next_version();
        update(optimizer, "w1", &grad.w1, &mut self.eg2_w1, &mut self.w1)?;
        update(optimizer, "b1", &grad.b1, &mut self.eg2_b1, &mut self.b1)?;
        update(optimizer, "w2", &grad.w2, &mut self.eg2_w2, &mut self.w2)?;
        update(optimizer, "e", &grad.e, &mut self.eg2_e, &mut self.e)?;

        self.generation += 1;
        Ok(())
    }

    /// Consumes the store and returns `(e, w1, b1, w2)`.
    pub fn into_parts(self) -> (Array2<f64>, Array2<f64>, Array1<f64>, Array2<f64>) {
        (self.e, self.w1, self.b1, self.w2)
    }
}

fn standard_layout<D: Dimension>(a: Array<f64, D>) -> Array<f64, D> {
    if a.is_standard_layout() {
        a
    } else {
        a.as_standard_layout().into_owned()
    }
}

fn update<O: Optimizer, D: Dimension>(
    optimizer: &mut O,
    what: &'static str,
    grad: &Array<f64, D>,
    history: &mut Array<f64, D>,
    params: &mut Array<f64, D>,
) -> Result<()> {
    let contiguous = || MlErr::NonContiguous(what);
    let grad = grad.as_slice().ok_or_else(contiguous)?;
    let history = history.as_slice_mut().ok_or_else(contiguous)?;
    let params = params.as_slice_mut().ok_or_else(contiguous)?;

    optimizer.update_params(grad, history, params)
}
