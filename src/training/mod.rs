mod gradient;
mod stats;
mod trainer;
mod worker;

pub use gradient::GradientBundle;
pub use stats::StepStats;
pub use trainer::Trainer;
pub use worker::GradientWorker;
