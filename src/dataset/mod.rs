mod dataset;
mod example;
pub mod shard;

pub use dataset::Dataset;
pub use example::{Example, Mark};
pub use shard::partition_into_folds;
