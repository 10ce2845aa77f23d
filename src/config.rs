use std::{fs, num::NonZeroUsize, path::Path, thread};

use serde::{Deserialize, Serialize};

use crate::{MlErr, Result};

/// The hyperparameters of the classifier, read once at construction.
///
/// Every field has a default, so a partial JSON document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub embedding_size: usize,
    pub hidden_size: usize,
    /// Number of input token slots per feature vector.
    pub num_tokens: usize,
    pub batch_size: usize,
    /// AdaGrad's global step size.
    pub learning_rate: f64,
    pub ada_eps: f64,
    /// L2 regularization coefficient.
    pub reg_parameter: f64,
    pub drop_prob: f64,
    /// Upper bound on the amount of (row, slot) pairs kept in the precompute cache.
    pub num_pre_computed: usize,
    /// Half-width of the uniform range used for random initialization.
    pub init_range: f64,
    pub max_iter: usize,
    pub training_threads: Option<NonZeroUsize>,
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding_size: 50,
            hidden_size: 200,
            num_tokens: 48,
            batch_size: 10000,
            learning_rate: 0.01,
            ada_eps: 1e-6,
            reg_parameter: 1e-8,
            drop_prob: 0.5,
            num_pre_computed: 100000,
            init_range: 0.01,
            max_iter: 20000,
            training_threads: None,
            seed: None,
        }
    }
}

impl Config {
    /// Parses and validates a configuration from a JSON document.
    ///
    /// # Arguments
    /// * `json` - The JSON text.
    ///
    /// # Returns
    /// The configuration or an error if it's malformed or invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Arguments
    /// * `path` - The location of the file.
    ///
    /// # Returns
    /// The configuration or an error if the file can't be read or is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Checks the hyperparameters are in their valid ranges.
    ///
    /// # Returns
    /// An `InvalidConfig` error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_size == 0 {
            return Err(MlErr::InvalidConfig("embedding_size must be positive"));
        }
        if self.hidden_size == 0 {
            return Err(MlErr::InvalidConfig("hidden_size must be positive"));
        }
        if self.num_tokens == 0 {
            return Err(MlErr::InvalidConfig("num_tokens must be positive"));
        }
        self.step_params().validate()?;
        if !(self.init_range >= 0.0) {
            return Err(MlErr::InvalidConfig("init_range must be non negative"));
        }

        Ok(())
    }

    /// Returns the amount of gradient workers, one less than the hardware parallelism unless
    /// `training_threads` overrides it.
    pub fn num_workers(&self) -> NonZeroUsize {
        self.training_threads.unwrap_or_else(|| {
            let cores = thread::available_parallelism().map_or(1, NonZeroUsize::get);
            NonZeroUsize::new(cores.saturating_sub(1)).unwrap_or(NonZeroUsize::MIN)
        })
    }

    /// Returns the width of the first layer's input, that is, `num_tokens * embedding_size`.
    pub fn input_size(&self) -> usize {
        self.num_tokens * self.embedding_size
    }

    /// Returns the per-step knobs described by this configuration.
    pub fn step_params(&self) -> StepParams {
        StepParams {
            batch_size: self.batch_size,
            l2: self.reg_parameter,
            drop_prob: self.drop_prob,
            learning_rate: self.learning_rate,
            epsilon: self.ada_eps,
        }
    }
}

/// The knobs of a single minibatch update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepParams {
    pub batch_size: usize,
    pub l2: f64,
    pub drop_prob: f64,
    pub learning_rate: f64,
    pub epsilon: f64,
}

impl StepParams {
    /// Checks every knob is in its valid range.
    ///
    /// # Returns
    /// An `InvalidConfig` error naming the first offending knob.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(MlErr::InvalidConfig("batch_size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.drop_prob) {
            return Err(MlErr::InvalidConfig("drop_prob must be in [0, 1]"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(MlErr::InvalidConfig("learning_rate must be positive and finite"));
        }
        // a zero epsilon turns zero gradients into 0 / 0
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(MlErr::InvalidConfig("epsilon must be positive and finite"));
        }
        if !(self.l2 >= 0.0 && self.l2.is_finite()) {
            return Err(MlErr::InvalidConfig("l2 must be non negative and finite"));
        }

        Ok(())
    }
}
