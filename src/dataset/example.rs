use crate::{MlErr, Result};

/// How a transition relates to the gold parse in a single parser configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// The transition can't be applied; it takes no part in the loss or the argmax.
    Infeasible,
    /// The transition can be applied but is not gold.
    Feasible,
    /// The transition can be applied and is gold.
    Gold,
}

impl Mark {
    #[inline]
    pub fn is_feasible(self) -> bool {
        self != Mark::Infeasible
    }

    #[inline]
    pub fn is_gold(self) -> bool {
        self == Mark::Gold
    }

    /// The softmax target for this label, `1` for gold and `0` otherwise.
    #[inline]
    pub fn target(self) -> f64 {
        if self.is_gold() { 1.0 } else { 0.0 }
    }
}

impl TryFrom<i32> for Mark {
    type Error = i32;

    fn try_from(value: i32) -> std::result::Result<Self, Self::Error> {
        match value {
            -1 => Ok(Mark::Infeasible),
            0 => Ok(Mark::Feasible),
            1 => Ok(Mark::Gold),
            other => Err(other),
        }
    }
}

impl From<Mark> for i32 {
    fn from(mark: Mark) -> Self {
        match mark {
            Mark::Infeasible => -1,
            Mark::Feasible => 0,
            Mark::Gold => 1,
        }
    }
}

/// An immutable training instance: the embedding rows of every token slot plus the marks of
/// every transition label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    feature: Box<[usize]>,
    label: Box<[Mark]>,
}

impl Example {
    /// Creates a new `Example`.
    ///
    /// # Arguments
    /// * `feature` - One embedding row id per token slot.
    /// * `label` - One mark per transition, encoded as `-1` (infeasible), `0` (feasible) or `1` (gold).
    ///
    /// # Returns
    /// The example, or an error if a label value is out of range or no label is gold.
    pub fn new(feature: Vec<usize>, label: &[i32]) -> Result<Self> {
        let label = label
            .iter()
            .enumerate()
            .map(|(index, &value)| {
                Mark::try_from(value).map_err(|value| MlErr::InvalidLabel { index, value })
            })
            .collect::<Result<Box<[Mark]>>>()?;

        if !label.iter().any(|mark| mark.is_gold()) {
            return Err(MlErr::NoGoldLabel);
        }

        Ok(Self {
            feature: feature.into_boxed_slice(),
            label,
        })
    }

    pub fn feature(&self) -> &[usize] {
        &self.feature
    }

    pub fn label(&self) -> &[Mark] {
        &self.label
    }

    /// Returns the number of token slots.
    pub fn num_tokens(&self) -> usize {
        self.feature.len()
    }

    /// Returns the number of transition labels.
    pub fn num_labels(&self) -> usize {
        self.label.len()
    }
}
