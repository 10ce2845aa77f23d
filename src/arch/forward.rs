use ndarray::Array1;

use super::{CacheKey, Cube, PrecomputeCache, WeightStore};
use crate::Result;

/// Computes the first layer pre-activation (bias included) of `feature`, only for the hidden
/// units listed in `units`; every other unit stays at zero.
///
/// Slots whose (row, slot) pair is registered in `cache` read the precomputed contribution,
/// the rest are computed directly from `weights`. The caller must have validated `feature` and
/// the freshness of `cache`.
pub(crate) fn hidden_layer(
    weights: &WeightStore,
    cache: &PrecomputeCache,
    feature: &[usize],
    units: &[usize],
) -> Array1<f64> {
    let mut hidden = Array1::zeros(weights.hidden_size());
    let e = weights.e();

    for (slot, &row) in feature.iter().enumerate() {
        match cache.index_of(CacheKey::new(row, slot)) {
            Some(id) => {
                let saved = cache.saved(id);
                for &j in units {
                    hidden[j] += saved[j];
                }
            }
            None => {
                let embedding = e.row(row);
                let block = weights.w1_block(slot);
                for &j in units {
                    hidden[j] += block.row(j).dot(&embedding);
                }
            }
        }
    }

    let b1 = weights.b1();
    for &j in units {
        hidden[j] += b1[j];
    }

    hidden
}

/// Feeds `feature` forward through the whole network and returns the raw output scores, one per
/// label. No normalization is applied.
///
/// # Arguments
/// * `weights` - The network parameters.
/// * `cache` - Precomputed contributions, built from the current generation of `weights`.
/// * `feature` - One embedding row id per token slot.
///
/// # Returns
/// The scores, or an error if `feature` is malformed or `cache` is stale.
pub fn score(
    weights: &WeightStore,
    cache: &PrecomputeCache,
    feature: &[usize],
) -> Result<Array1<f64>> {
    weights.check_feature(feature)?;
    cache.ensure_fresh(weights)?;

    let units: Vec<usize> = (0..weights.hidden_size()).collect();
    let hidden3 = hidden_layer(weights, cache, feature, &units).mapv_into(|h| Cube.f(h));

    Ok(weights.w2().dot(&hidden3))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::MlErr;

    fn worked_weights() -> WeightStore {
        WeightStore::new(
            array![[1.0], [2.0]],
            array![[1.0, 1.0]],
            array![0.0],
            array![[1.0], [-1.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_worked_scores() {
        let store = worked_weights();
        let scores = score(&store, &PrecomputeCache::empty(), &[0, 1]).unwrap();

        assert_eq!(scores, array![27.0, -27.0]);
    }

    #[test]
    fn test_cached_slot_reproduces_hidden() {
        let store = worked_weights();
        let mut cache = PrecomputeCache::new([CacheKey::new(1, 1)]);
        cache.rebuild(&store).unwrap();

        assert_eq!(cache.saved(0), array![2.0]);

        let hidden = hidden_layer(&store, &cache, &[0, 1], &[0]);
        assert_eq!(hidden, array![3.0]);
        assert_eq!(
            score(&store, &cache, &[0, 1]).unwrap(),
            array![27.0, -27.0]
        );
    }

    #[test]
    fn test_inactive_units_stay_at_zero() {
        let store = WeightStore::new(
            array![[1.0], [2.0]],
            array![[1.0, 1.0], [2.0, 0.5]],
            array![0.5, 0.5],
            array![[1.0, 1.0]],
        )
        .unwrap();

        let hidden = hidden_layer(&store, &PrecomputeCache::empty(), &[0, 1], &[1]);
        assert_eq!(hidden, array![0.0, 3.5]);
    }

    #[test]
    fn test_score_rejects_malformed_feature() {
        let store = worked_weights();

        assert!(matches!(
            score(&store, &PrecomputeCache::empty(), &[0]),
            Err(MlErr::ShapeMismatch { what: "feature", .. })
        ));
        assert!(matches!(
            score(&store, &PrecomputeCache::empty(), &[0, 2]),
            Err(MlErr::ShapeMismatch { what: "embedding row", .. })
        ));
    }

    #[test]
    fn test_score_rejects_unbuilt_cache() {
        let store = worked_weights();
        let cache = PrecomputeCache::new([CacheKey::new(1, 1)]);

        assert!(matches!(
            score(&store, &cache, &[0, 1]),
            Err(MlErr::StaleCache { .. })
        ));
    }

    #[test]
    fn test_score_rejects_cache_of_other_weights() {
        let mut cache = PrecomputeCache::new([CacheKey::new(1, 1)]);
        cache.rebuild(&worked_weights()).unwrap();

        let other = WeightStore::new(
            array![[1.0], [5.0]],
            array![[1.0, 1.0]],
            array![0.0],
            array![[1.0], [-1.0]],
        )
        .unwrap();
        assert_eq!(
            score(&other, &PrecomputeCache::empty(), &[0, 1]).unwrap(),
            array![216.0, -216.0]
        );
        assert!(matches!(
            score(&other, &cache, &[0, 1]),
            Err(MlErr::StaleCache { .. })
        ));

        let wider = WeightStore::new(
            array![[1.0], [2.0]],
            array![[1.0, 1.0], [0.5, 0.5]],
            array![0.0, 0.0],
            array![[1.0, 1.0], [-1.0, 1.0]],
        )
        .unwrap();
        assert!(matches!(
            score(&wider, &cache, &[0, 1]),
            Err(MlErr::ShapeMismatch { what: "cache weights", .. })
        ));
    }
}
