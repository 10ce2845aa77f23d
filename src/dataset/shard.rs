use std::{num::NonZeroUsize, ops::Range};

/// Returns the indices of `items` that fold `fold` owns when `len` items are dealt among
/// `num_folds` workers in contiguous runs.
///
/// The first `len % num_folds` folds take one extra item, so no two folds differ in size by
/// more than one and the runs tile `0..len` in order.
pub fn fold_range(len: usize, fold: usize, num_folds: NonZeroUsize) -> Range<usize> {
    let n = num_folds.get();
    debug_assert!(fold < n);

    let (per_fold, leftover) = (len / n, len % n);
    let size = per_fold + usize::from(fold < leftover);
    let start = fold * per_fold + leftover.min(fold);

    start..start + size
}

/// Partitions `items` into at most `num_folds` near-equal, non-empty folds, keeping their order.
///
/// # Arguments
/// * `items` - The items to partition.
/// * `num_folds` - The maximum amount of folds.
///
/// # Returns
/// The folds as borrowed sub-slices of `items`.
pub fn partition_into_folds<T>(items: &[T], num_folds: NonZeroUsize) -> Vec<&[T]> {
    (0..num_folds.get())
        .map(|fold| &items[fold_range(items.len(), fold, num_folds)])
        .filter(|fold| !fold.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folds(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_leftover_items_go_to_the_first_folds() {
        let ranges: Vec<_> = (0..4).map(|fold| fold_range(14, fold, folds(4))).collect();

        assert_eq!(ranges, [0..4, 4..8, 8..11, 11..14]);
    }

    #[test]
    fn test_single_fold_owns_everything() {
        assert_eq!(fold_range(7, 0, folds(1)), 0..7);
        assert_eq!(fold_range(0, 0, folds(1)), 0..0);
    }

    #[test]
    fn test_partition_covers_items_in_order() {
        let items: Vec<usize> = (0..11).collect();
        let parts = partition_into_folds(&items, folds(4));

        assert_eq!(parts.len(), 4);
        assert_eq!(parts.iter().map(|p| p.len()).collect::<Vec<_>>(), [3, 3, 3, 2]);
        assert_eq!(parts.concat(), items);
    }

    #[test]
    fn test_partition_skips_empty_folds() {
        let items = [1, 2];
        let parts = partition_into_folds(&items, folds(5));

        assert_eq!(parts, [&[1][..], &[2][..]]);
    }
}
