use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire classifier crate.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The classifier's error type.
#[derive(Debug)]
pub enum MlErr {
    /// A dimension invariant was violated (e.g. a feature vector of the wrong length).
    ShapeMismatch {
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// A label entry is not one of `-1`, `0` or `1`.
    InvalidLabel {
        index: usize,
        value: i32,
    },
    /// The example has no label marked as gold.
    NoGoldLabel,
    EmptyDataset,
    EmptyBatch,
    InvalidConfig(&'static str),
    /// The precompute cache was built from older weights than the current ones.
    StaleCache {
        built: Option<u64>,
        current: u64,
    },
    NonFiniteCost(f64),
    /// A parameter buffer isn't laid out contiguously in row-major order.
    NonContiguous(&'static str),
    ThreadPool(String),
    Config(serde_json::Error),
    Io(io::Error),
}

impl MlErr {
    /// Builds a `ShapeMismatch` error.
    ///
    /// # Arguments
    /// * `what` - Human readable name of the mismatching buffer.
    /// * `got` - The observed dimensions.
    /// * `expected` - The expected dimensions.
    pub fn shape(what: &'static str, got: &[usize], expected: &[usize]) -> Self {
        Self::ShapeMismatch {
            what,
            got: got.to_vec(),
            expected: expected.to_vec(),
        }
    }
}

/// Fails with a `ShapeMismatch` unless `got == expected`.
pub(crate) fn check_shape(what: &'static str, got: &[usize], expected: &[usize]) -> Result<()> {
    if got != expected {
        return Err(MlErr::shape(what, got, expected));
    }

    Ok(())
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch for {what}: got {got:?}, expected {expected:?}"
            ),
            MlErr::InvalidLabel { index, value } => write!(
                f,
                "label {index} has value {value}, expected one of -1, 0 or 1"
            ),
            MlErr::NoGoldLabel => f.write_str("the example has no label marked as gold"),
            MlErr::EmptyDataset => f.write_str("cannot sample from an empty dataset"),
            MlErr::EmptyBatch => f.write_str("the minibatch is empty"),
            MlErr::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            MlErr::StaleCache {
                built: Some(built),
                current,
            } => write!(
                f,
                "the precompute cache was built from weights at generation {built}, not from the current ones at generation {current}"
            ),
            MlErr::StaleCache {
                built: None,
                current,
            } => write!(
                f,
                "the precompute cache was never built, the weights are at generation {current}"
            ),
            MlErr::NonFiniteCost(cost) => write!(f, "the minibatch cost is not finite: {cost}"),
            MlErr::NonContiguous(what) => write!(f, "{what} is not contiguous in memory"),
            MlErr::ThreadPool(msg) => write!(f, "failed to build the worker pool: {msg}"),
            MlErr::Config(e) => write!(f, "failed to parse configuration: {e}"),
            MlErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Config(e) => Some(e),
            MlErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for MlErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value)
    }
}
