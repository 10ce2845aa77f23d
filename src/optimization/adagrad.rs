use super::Optimizer;
use crate::{Result, error::check_shape};

/// AdaGrad: each parameter's step is scaled by the inverse root of its accumulated squared
/// gradients.
#[derive(Debug, Clone, Copy)]
pub struct AdaGrad {
    learning_rate: f64,
    epsilon: f64,
}

impl AdaGrad {
    /// Creates a new `AdaGrad` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The global step size.
    /// * `epsilon` - Added to the accumulated squared gradient before taking its root.
    ///
    /// # Returns
    /// A new `AdaGrad` instance.
    pub fn new(learning_rate: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            epsilon,
        }
    }
}

impl Optimizer for AdaGrad {
    fn update_params(
        &mut self,
        grad: &[f64],
        history: &mut [f64],
        params: &mut [f64],
    ) -> Result<()> {
        check_shape("adagrad history", &[history.len()], &[params.len()])?;
        check_shape("adagrad grad", &[grad.len()], &[params.len()])?;

        let Self {
            learning_rate: lr,
            epsilon: eps,
        } = *self;

        params
            .iter_mut()
            .zip(grad)
            .zip(history.iter_mut())
            .for_each(|((p, g), eg2)| {
                *eg2 += g * g;
                *p -= lr * g / (*eg2 + eps).sqrt();
            });

        Ok(())
    }
}
