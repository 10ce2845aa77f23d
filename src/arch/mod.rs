mod activation;
mod cache;
mod forward;
mod loss;
mod weights;

pub use activation::Cube;
pub use cache::{CacheKey, PrecomputeCache};
pub(crate) use forward::hidden_layer;
pub use forward::score;
pub use loss::{MaskedSoftmax, SoftmaxOutput};
pub use weights::WeightStore;
