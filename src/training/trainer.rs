use std::{num::NonZeroUsize, time::Instant};

use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};

use super::{GradientBundle, GradientWorker, StepStats};
use crate::{
    MlErr, Result,
    classifier::Classifier,
    config::StepParams,
    dataset::{Dataset, partition_into_folds},
    error::check_shape,
    optimization::AdaGrad,
};

/// Drives minibatch training of a `Classifier`.
///
/// Each step samples a minibatch, fans its folds out to a pool of gradient workers, merges their
/// gradients and applies a single AdaGrad update. Workers only read the weights, so the update
/// happens after every worker is done.
pub struct Trainer<R: Rng = StdRng> {
    classifier: Classifier,
    dataset: Dataset,
    pool: ThreadPool,
    num_workers: NonZeroUsize,
    rng: R,
}

impl Trainer {
    /// Creates a new `Trainer`, seeding its random number generator from `config.seed` if set.
    ///
    /// # Arguments
    /// * `classifier` - The classifier to train.
    /// * `dataset` - The training examples.
    pub fn new(classifier: Classifier, dataset: Dataset) -> Result<Self> {
        let rng = generate_rng(classifier.config().seed);
        Self::with_rng(classifier, dataset, rng)
    }
}

impl<R: Rng> Trainer<R> {
    /// Creates a new `Trainer` that draws minibatches and dropout seeds from `rng`.
    ///
    /// # Returns
    /// The trainer, or an error if the dataset doesn't match the classifier or the worker pool
    /// can't be spawned.
    pub fn with_rng(classifier: Classifier, dataset: Dataset, rng: R) -> Result<Self> {
        let weights = classifier.weights();
        check_shape(
            "dataset",
            &[dataset.num_features(), dataset.num_labels()],
            &[weights.num_tokens(), weights.num_labels()],
        )?;

        let num_workers = classifier.config().num_workers();
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_workers.get())
            .thread_name(|i| format!("gradient-worker-{i}"))
            .build()
            .map_err(|e| MlErr::ThreadPool(e.to_string()))?;

        Ok(Self {
            classifier,
            dataset,
            pool,
            num_workers,
            rng,
        })
    }

    /// Runs a single minibatch update.
    ///
    /// # Arguments
    /// * `params` - The batch size, regularization, dropout and AdaGrad knobs of this step.
    ///
    /// # Returns
    /// The step's statistics, or an error if `params` or any input is malformed, a worker fails
    /// or the cost isn't finite, in which case the weights are left untouched.
    pub fn step(&mut self, params: StepParams) -> Result<StepStats> {
        params.validate()?;
        let batch = self.dataset.sample(params.batch_size, &mut self.rng)?;

        let start = Instant::now();
        let mut cache = self.classifier.cache().restrict(batch.iter().copied());
        let weights = self.classifier.weights();
        cache.rebuild(weights)?;

        debug!(
            touched = cache.len(),
            registered = self.classifier.cache().len(),
            elapsed_us = start.elapsed().as_micros() as u64;
            "rebuilt minibatch cache"
        );

        let worker = GradientWorker::new(weights, &cache, batch.len(), params.drop_prob)?;
        let folds = partition_into_folds(&batch, self.num_workers);
        let seeds: Vec<u64> = folds.iter().map(|_| self.rng.random()).collect();

        let bundles = self.pool.install(|| {
            folds
                .par_iter()
                .zip(&seeds)
                .map(|(fold, &seed)| worker.compute(fold, &mut StdRng::seed_from_u64(seed)))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut grad = GradientBundle::aggregate(bundles)?;
        grad.add_l2(weights, params.l2)?;

        let cost = grad.cost();
        if !cost.is_finite() {
            return Err(MlErr::NonFiniteCost(cost));
        }

        let mut adagrad = AdaGrad::new(params.learning_rate, params.epsilon);
        self.classifier.weights_mut().apply(&mut adagrad, &grad)?;

        Ok(StepStats::new(cost, grad.accuracy(), batch.len(), cache.len()))
    }

    /// Trains for `config.max_iter` steps with the parameters of the classifier's configuration,
    /// then rebuilds its precompute cache.
    ///
    /// # Returns
    /// The statistics of every step.
    pub fn train(&mut self) -> Result<Vec<StepStats>> {
        let config = self.classifier.config();
        let (max_iter, params) = (config.max_iter, config.step_params());
        let mut stats = Vec::with_capacity(max_iter);

        for _ in 0..max_iter {
            stats.push(self.step(params)?);
        }

        self.classifier.precompute()?;
        Ok(stats)
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn num_workers(&self) -> NonZeroUsize {
        self.num_workers
    }

    /// Consumes the trainer, returning the classifier. Its cache is stale if steps ran after the
    /// last `Classifier::precompute`.
    pub fn into_classifier(self) -> Classifier {
        self.classifier
    }
}

fn generate_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}
