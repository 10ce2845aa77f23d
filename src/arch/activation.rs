/// The cubic activation of the hidden layer, `f(x) = x^3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cube;

impl Cube {
    #[inline]
    pub fn f(&self, x: f64) -> f64 {
        x * x * x
    }

    /// The derivative, `3x^2`.
    #[inline]
    pub fn df(&self, x: f64) -> f64 {
        3.0 * x * x
    }
}
