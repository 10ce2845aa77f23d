pub mod arch;
mod classifier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod optimization;
pub mod training;

pub use classifier::Classifier;
pub use config::{Config, StepParams};
pub use error::{MlErr, Result};
