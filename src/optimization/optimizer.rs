use crate::Result;

/// Defines the strategy for updating model parameters based on a minibatch gradient.
pub trait Optimizer {
    /// Updates `params` in place using `grad` and the per-parameter `history` the rule keeps.
    ///
    /// # Arguments
    /// * `grad` - The gradient of the parameters.
    /// * `history` - The optimizer state kept alongside the parameters.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of the three slices.
    fn update_params(&mut self, grad: &[f64], history: &mut [f64], params: &mut [f64])
    -> Result<()>;
}
