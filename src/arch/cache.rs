use std::collections::HashMap;

use ndarray::{Array2, ArrayView1};

use super::WeightStore;
use crate::{MlErr, Result, dataset::Example, error::check_shape};

/// Identifies the contribution of embedding row `row` placed at token slot `slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub row: usize,
    pub slot: usize,
}

impl CacheKey {
    pub fn new(row: usize, slot: usize) -> Self {
        Self { row, slot }
    }

    /// Decodes a key stored in the flat `row * num_tokens + slot` form.
    pub fn from_encoded(id: usize, num_tokens: usize) -> Self {
        Self {
            row: id / num_tokens,
            slot: id % num_tokens,
        }
    }

    /// Encodes this key in the flat `row * num_tokens + slot` form.
    pub fn encode(&self, num_tokens: usize) -> usize {
        self.row * num_tokens + self.slot
    }
}

/// Memoized hidden layer contributions of a fixed set of (row, slot) pairs.
///
/// Row `i` of `saved` holds `W1[.., slot block] . E[row]` for the `i`-th registered key. The
/// values are only meaningful together with the exact weights they were built from.
#[derive(Debug, Clone)]
pub struct PrecomputeCache {
    keys: Vec<CacheKey>,
    index: HashMap<CacheKey, usize>,
    saved: Array2<f64>,
    built: Option<BuildStamp>,
}

/// The weights a cache was last built from.
#[derive(Debug, Clone, Copy)]
struct BuildStamp {
    version: u64,
    generation: u64,
    /// `[vocab_size, embedding_size, hidden_size, num_tokens]`
    dims: [usize; 4],
}

fn dims_of(weights: &WeightStore) -> [usize; 4] {
    [
        weights.vocab_size(),
        weights.embedding_size(),
        weights.hidden_size(),
        weights.num_tokens(),
    ]
}

impl PrecomputeCache {
    /// Registers `keys`, dropping duplicates. The cache must be rebuilt before it's read.
    ///
    /// # Arguments
    /// * `keys` - The (row, slot) pairs worth precomputing.
    pub fn new<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = CacheKey>,
    {
        let mut index = HashMap::new();
        let mut unique = Vec::new();

        for key in keys {
            index.entry(key).or_insert_with(|| {
                unique.push(key);
                unique.len() - 1
            });
        }

        Self {
            keys: unique,
            index,
            saved: Array2::zeros((0, 0)),
            built: None,
        }
    }

    /// A cache with no registered keys; every contribution is computed directly.
    pub fn empty() -> Self {
        Self::new(std::iter::empty::<CacheKey>())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[CacheKey] {
        &self.keys
    }

    /// Returns the cache row of `key`, if registered.
    #[inline]
    pub fn index_of(&self, key: CacheKey) -> Option<usize> {
        self.index.get(&key).copied()
    }

    /// Returns the precomputed contribution stored at cache row `id`.
    #[inline]
    pub fn saved(&self, id: usize) -> ArrayView1<'_, f64> {
        self.saved.row(id)
    }

    /// The weight generation this cache was last built from.
    pub fn built_at(&self) -> Option<u64> {
        self.built.map(|stamp| stamp.generation)
    }

    /// Returns a new cache holding only the registered keys that appear in `examples`, in
    /// registration order. The result must be rebuilt before it's read.
    ///
    /// # Arguments
    /// * `examples` - The examples of a minibatch.
    pub fn restrict<'a, I>(&self, examples: I) -> Self
    where
        I: IntoIterator<Item = &'a Example>,
    {
        let mut needed = vec![false; self.keys.len()];

        for example in examples {
            for (slot, &row) in example.feature().iter().enumerate() {
                if let Some(id) = self.index_of(CacheKey::new(row, slot)) {
                    needed[id] = true;
                }
            }
        }

        let keys = self
            .keys
            .iter()
            .zip(needed)
            .filter_map(|(&key, needed)| needed.then_some(key));

        Self::new(keys)
    }

    /// Recomputes the contribution of every registered key from the current `weights`.
    ///
    /// # Arguments
    /// * `weights` - The weights to precompute from.
    ///
    /// # Returns
    /// A `ShapeMismatch` if a key's row or slot is out of range for `weights`.
    pub fn rebuild(&mut self, weights: &WeightStore) -> Result<()> {
        if let Some(key) = self
            .keys
            .iter()
            .find(|key| key.row >= weights.vocab_size() || key.slot >= weights.num_tokens())
        {
            return Err(MlErr::shape(
                "cache key",
                &[key.row, key.slot],
                &[weights.vocab_size(), weights.num_tokens()],
            ));
        }

        let mut saved = Array2::zeros((self.keys.len(), weights.hidden_size()));
        let e = weights.e();

        for (mut row, key) in saved.rows_mut().into_iter().zip(&self.keys) {
            row.assign(&weights.w1_block(key.slot).dot(&e.row(key.row)));
        }

        self.saved = saved;
        self.built = Some(BuildStamp {
            version: weights.version(),
            generation: weights.generation(),
            dims: dims_of(weights),
        });
        Ok(())
    }

    /// Checks the cache may be read together with `weights`.
    ///
    /// # Returns
    /// If the cache has registered keys, a `ShapeMismatch` when it was built from weights of
    /// other dimensions, or a `StaleCache` when it was never built or was built from other
    /// parameter values than the current ones of `weights`.
    pub fn ensure_fresh(&self, weights: &WeightStore) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let stale = |built| MlErr::StaleCache {
            built,
            current: weights.generation(),
        };
        let stamp = self.built.ok_or_else(|| stale(None))?;

        check_shape("cache weights", &stamp.dims, &dims_of(weights))?;
        if stamp.version != weights.version() {
            return Err(stale(Some(stamp.generation)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, array};

    use super::*;

    fn weights() -> WeightStore {
        WeightStore::new(
            array![[1.0, 0.5], [2.0, -1.0], [0.0, 3.0]],
            array![[1.0, 2.0, 3.0, 4.0], [-1.0, 0.0, 1.0, 0.5]],
            Array1::zeros(2),
            array![[1.0, 1.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_key_encoding() {
        let key = CacheKey::new(7, 2);

        assert_eq!(key.encode(3), 23);
        assert_eq!(CacheKey::from_encoded(23, 3), key);
    }

    #[test]
    fn test_duplicate_keys_are_dropped() {
        let cache = PrecomputeCache::new([
            CacheKey::new(1, 0),
            CacheKey::new(2, 1),
            CacheKey::new(1, 0),
        ]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.index_of(CacheKey::new(1, 0)), Some(0));
        assert_eq!(cache.index_of(CacheKey::new(2, 1)), Some(1));
        assert_eq!(cache.index_of(CacheKey::new(2, 0)), None);
    }

    #[test]
    fn test_rebuild_computes_slot_dot_products() {
        let store = weights();
        let mut cache = PrecomputeCache::new([CacheKey::new(1, 1), CacheKey::new(0, 0)]);
        cache.rebuild(&store).unwrap();

        // slot 1 columns are [3, 4] and [1, 0.5], row 1 is [2, -1]
        assert_eq!(cache.saved(0), array![2.0, 1.5]);
        // slot 0 columns are [1, 2] and [-1, 0], row 0 is [1, 0.5]
        assert_eq!(cache.saved(1), array![2.0, -1.0]);
        assert_eq!(cache.built_at(), Some(0));
    }

    #[test]
    fn test_rebuild_rejects_out_of_range_keys() {
        let store = weights();

        let mut cache = PrecomputeCache::new([CacheKey::new(3, 0)]);
        assert!(matches!(
            cache.rebuild(&store),
            Err(MlErr::ShapeMismatch { what: "cache key", .. })
        ));

        let mut cache = PrecomputeCache::new([CacheKey::new(0, 2)]);
        assert!(cache.rebuild(&store).is_err());
    }

    #[test]
    fn test_restrict_keeps_touched_keys() {
        let cache = PrecomputeCache::new([
            CacheKey::new(0, 0),
            CacheKey::new(1, 1),
            CacheKey::new(2, 0),
        ]);
        let examples = [
            Example::new(vec![2, 0], &[1]).unwrap(),
            Example::new(vec![1, 1], &[1]).unwrap(),
        ];

        let small = cache.restrict(&examples);
        assert_eq!(small.keys(), &[CacheKey::new(1, 1), CacheKey::new(2, 0)]);
        assert_eq!(small.built_at(), None);
    }

    #[test]
    fn test_freshness() {
        let store = weights();
        let mut cache = PrecomputeCache::new([CacheKey::new(0, 0)]);

        assert!(matches!(
            cache.ensure_fresh(&store),
            Err(MlErr::StaleCache { built: None, current: 0 })
        ));

        cache.rebuild(&store).unwrap();
        assert!(cache.ensure_fresh(&store).is_ok());
        assert!(PrecomputeCache::empty().ensure_fresh(&store).is_ok());
    }

    #[test]
    fn test_cache_is_bound_to_the_weights_it_was_built_from() {
        let store = weights();
        let mut cache = PrecomputeCache::new([CacheKey::new(1, 1)]);
        cache.rebuild(&store).unwrap();
        assert!(cache.ensure_fresh(&store.clone()).is_ok());

        // same dimensions and generation, other values
        let (mut e, w1, b1, w2) = store.clone().into_parts();
        e[[1, 0]] = 5.0;
        let other = WeightStore::new(e, w1, b1, w2).unwrap();
        assert_eq!(other.generation(), store.generation());
        assert!(matches!(
            cache.ensure_fresh(&other),
            Err(MlErr::StaleCache { built: Some(0), current: 0 })
        ));

        let wider = WeightStore::new(
            array![[1.0, 0.5], [2.0, -1.0], [0.0, 3.0]],
            Array2::zeros((3, 4)),
            Array1::zeros(3),
            array![[1.0, 1.0, 1.0]],
        )
        .unwrap();
        assert!(matches!(
            cache.ensure_fresh(&wider),
            Err(MlErr::ShapeMismatch { what: "cache weights", .. })
        ));
    }
}
