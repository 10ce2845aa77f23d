/// Statistics produced by a single training step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepStats {
    cost: f64,
    accuracy: f64,
    examples: usize,
    cached_keys: usize,
}

impl StepStats {
    /// Creates a new `StepStats`.
    ///
    /// # Arguments
    /// * `cost` - The regularized minibatch cost.
    /// * `accuracy` - The fraction of examples whose best feasible label was gold.
    /// * `examples` - The number of sampled examples.
    /// * `cached_keys` - The number of cached contributions the minibatch touched.
    pub fn new(cost: f64, accuracy: f64, examples: usize, cached_keys: usize) -> Self {
        Self {
            cost,
            accuracy,
            examples,
            cached_keys,
        }
    }

    /// Returns the regularized minibatch cost.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Returns the training accuracy of the minibatch, in `[0, 1]`.
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn examples(&self) -> usize {
        self.examples
    }

    pub fn cached_keys(&self) -> usize {
        self.cached_keys
    }
}
