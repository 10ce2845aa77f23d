use rand::Rng;

use super::Example;
use crate::{MlErr, Result, error::check_shape};

/// An insertion-ordered collection of training examples sharing the same amount of token slots
/// and transition labels.
///
/// A `Dataset` is filled once and then handed over to the training coordinator, which only
/// reads from it.
#[derive(Debug, Clone)]
pub struct Dataset {
    num_features: usize,
    num_labels: usize,
    examples: Vec<Example>,
}

impl Dataset {
    /// Creates a new empty `Dataset`.
    ///
    /// # Arguments
    /// * `num_features` - The amount of token slots of every example.
    /// * `num_labels` - The amount of transition labels of every example.
    pub fn new(num_features: usize, num_labels: usize) -> Self {
        Self {
            num_features,
            num_labels,
            examples: Vec::new(),
        }
    }

    /// Builds a `Dataset` out of already constructed examples.
    ///
    /// # Returns
    /// An error if any example doesn't match the given dimensions.
    pub fn from_examples<I>(num_features: usize, num_labels: usize, examples: I) -> Result<Self>
    where
        I: IntoIterator<Item = Example>,
    {
        let mut dataset = Self::new(num_features, num_labels);
        for example in examples {
            dataset.push(example)?;
        }

        Ok(dataset)
    }

    /// Validates and appends a raw example.
    ///
    /// # Arguments
    /// * `feature` - One embedding row id per token slot.
    /// * `label` - One mark per transition (`-1`, `0` or `1`).
    ///
    /// # Returns
    /// An error if the example is malformed or doesn't match the dataset's dimensions.
    pub fn add_example(&mut self, feature: Vec<usize>, label: &[i32]) -> Result<()> {
        let example = Example::new(feature, label)?;
        self.push(example)
    }

    /// Appends an example.
    ///
    /// # Returns
    /// An error if the example doesn't match the dataset's dimensions.
    pub fn push(&mut self, example: Example) -> Result<()> {
        check_shape("feature", &[example.num_tokens()], &[self.num_features])?;
        check_shape("label", &[example.num_labels()], &[self.num_labels])?;
        self.examples.push(example);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Example> {
        self.examples.get(idx)
    }

    #[inline]
    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    #[inline]
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    #[inline]
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// Draws `batch_size` examples uniformly at random, with replacement.
    ///
    /// # Arguments
    /// * `batch_size` - The amount of examples to draw.
    /// * `rng` - A random number generator.
    ///
    /// # Returns
    /// The sampled examples, or an error if the dataset or the batch size are empty.
    pub fn sample<'a, R: Rng>(
        &'a self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<Vec<&'a Example>> {
        if self.is_empty() {
            return Err(MlErr::EmptyDataset);
        }
        if batch_size == 0 {
            return Err(MlErr::EmptyBatch);
        }

        let batch = (0..batch_size)
            .map(|_| &self.examples[rng.random_range(0..self.examples.len())])
            .collect();

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn toy_dataset() -> Dataset {
        let mut ds = Dataset::new(2, 3);
        ds.add_example(vec![0, 1], &[1, 0, -1]).unwrap();
        ds.add_example(vec![1, 2], &[0, 1, 0]).unwrap();
        ds.add_example(vec![2, 0], &[-1, 0, 1]).unwrap();
        ds
    }

    #[test]
    fn test_dataset_basic() {
        let ds = toy_dataset();

        assert_eq!(ds.len(), 3);
        assert!(!ds.is_empty());
        assert_eq!(ds.num_features(), 2);
        assert_eq!(ds.num_labels(), 3);
        assert_eq!(ds.get(1).unwrap().feature(), &[1, 2]);
        assert!(ds.get(3).is_none());
    }

    #[test]
    fn test_dataset_rejects_wrong_dimensions() {
        let mut ds = Dataset::new(2, 3);

        let err = ds.add_example(vec![0, 1, 2], &[1, 0, 0]).unwrap_err();
        assert!(matches!(err, MlErr::ShapeMismatch { what: "feature", .. }));

        let err = ds.add_example(vec![0, 1], &[1, 0]).unwrap_err();
        assert!(matches!(err, MlErr::ShapeMismatch { what: "label", .. }));

        assert!(ds.is_empty());
    }

    #[test]
    fn test_sample_with_replacement() {
        let ds = toy_dataset();
        let mut rng = StdRng::seed_from_u64(42);

        let batch = ds.sample(50, &mut rng).unwrap();
        assert_eq!(batch.len(), 50);
        assert!(batch.iter().all(|ex| ds.examples().contains(ex)));
    }

    #[test]
    fn test_sample_from_empty_dataset() {
        let ds = Dataset::new(2, 3);
        let mut rng = StdRng::seed_from_u64(0);

        assert!(matches!(ds.sample(4, &mut rng), Err(MlErr::EmptyDataset)));
        assert!(matches!(toy_dataset().sample(0, &mut rng), Err(MlErr::EmptyBatch)));
    }
}
