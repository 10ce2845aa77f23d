use std::{collections::HashSet, time::Instant};

use log::info;
use ndarray::Array1;

use crate::{
    MlErr, Result,
    arch::{self, CacheKey, PrecomputeCache, WeightStore},
    config::Config,
    error::check_shape,
};

/// The action classifier of the parser: a configuration, the network weights and the
/// precomputed contributions of its most frequent (row, slot) pairs.
#[derive(Debug, Clone)]
pub struct Classifier {
    config: Config,
    weights: WeightStore,
    cache: PrecomputeCache,
}

impl Classifier {
    /// Creates a new `Classifier` and builds its precompute cache.
    ///
    /// # Arguments
    /// * `config` - The hyperparameters.
    /// * `weights` - The initial (or trained) weights.
    /// * `keys` - The (row, slot) pairs to precompute, most frequent first. Only the first
    ///   `config.num_pre_computed` distinct pairs are kept.
    ///
    /// # Returns
    /// The classifier, or an error if the configuration is invalid, the weights don't match it
    /// or a key is out of range.
    pub fn new<I>(config: Config, weights: WeightStore, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = CacheKey>,
    {
        config.validate()?;
        check_shape(
            "weights",
            &[
                weights.embedding_size(),
                weights.hidden_size(),
                weights.num_tokens(),
            ],
            &[config.embedding_size, config.hidden_size, config.num_tokens],
        )?;

        let mut seen = HashSet::new();
        let keys = keys
            .into_iter()
            .filter(|&key| seen.insert(key))
            .take(config.num_pre_computed);
        let cache = PrecomputeCache::new(keys);
        let mut classifier = Self {
            config,
            weights,
            cache,
        };
        classifier.precompute()?;

        Ok(classifier)
    }

    /// Recomputes every cached contribution from the current weights. Must be called after
    /// training and before scoring.
    pub fn precompute(&mut self) -> Result<()> {
        let start = Instant::now();
        self.cache.rebuild(&self.weights)?;

        info!(
            keys = self.cache.len(),
            elapsed_ms = start.elapsed().as_millis() as u64;
            "precomputed hidden contributions"
        );
        Ok(())
    }

    /// Scores every label for a feature vector.
    ///
    /// # Returns
    /// One unnormalized score per label, or an error if the feature is malformed or the cache
    /// is stale.
    pub fn score(&self, feature: &[usize]) -> Result<Array1<f64>> {
        arch::score(&self.weights, &self.cache, feature)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn weights(&self) -> &WeightStore {
        &self.weights
    }

    pub fn cache(&self) -> &PrecomputeCache {
        &self.cache
    }

    pub(crate) fn weights_mut(&mut self) -> &mut WeightStore {
        &mut self.weights
    }

    pub fn into_weights(self) -> WeightStore {
        self.weights
    }
}

impl TryFrom<(Config, WeightStore)> for Classifier {
    type Error = MlErr;

    /// Builds a classifier without a precompute cache.
    fn try_from((config, weights): (Config, WeightStore)) -> Result<Self> {
        Self::new(config, weights, std::iter::empty())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn worked() -> (Config, WeightStore) {
        let config = Config {
            embedding_size: 1,
            hidden_size: 1,
            num_tokens: 2,
            ..Config::default()
        };
        let weights = WeightStore::new(
            array![[1.0], [2.0]],
            array![[1.0, 1.0]],
            array![0.0],
            array![[1.0], [-1.0]],
        )
        .unwrap();

        (config, weights)
    }

    #[test]
    fn test_score_with_cache() {
        let (config, weights) = worked();
        let classifier = Classifier::new(config, weights, [CacheKey::new(1, 1)]).unwrap();

        assert_eq!(classifier.cache().len(), 1);
        assert_eq!(classifier.score(&[0, 1]).unwrap(), array![27.0, -27.0]);
    }

    #[test]
    fn test_num_pre_computed_bounds_the_cache() {
        let (mut config, weights) = worked();
        config.num_pre_computed = 2;
        let keys = [
            CacheKey::new(0, 0),
            CacheKey::new(1, 1),
            CacheKey::new(1, 0),
        ];

        let classifier = Classifier::new(config, weights, keys).unwrap();
        assert_eq!(classifier.cache().keys(), &keys[..2]);
    }

    #[test]
    fn test_duplicate_keys_do_not_use_up_the_cache_budget() {
        let (mut config, weights) = worked();
        config.num_pre_computed = 2;
        let keys = [
            CacheKey::new(1, 1),
            CacheKey::new(1, 1),
            CacheKey::new(1, 1),
            CacheKey::new(0, 0),
            CacheKey::new(1, 0),
        ];

        let classifier = Classifier::new(config, weights, keys).unwrap();
        assert_eq!(
            classifier.cache().keys(),
            &[CacheKey::new(1, 1), CacheKey::new(0, 0)]
        );
    }

    #[test]
    fn test_rejects_weights_not_matching_config() {
        let (mut config, weights) = worked();
        config.hidden_size = 3;

        let res = Classifier::try_from((config, weights));
        assert!(matches!(res, Err(MlErr::ShapeMismatch { what: "weights", .. })));
    }

    #[test]
    fn test_rejects_out_of_range_key() {
        let (config, weights) = worked();

        let res = Classifier::new(config, weights, [CacheKey::new(5, 0)]);
        assert!(matches!(res, Err(MlErr::ShapeMismatch { what: "cache key", .. })));
    }
}
