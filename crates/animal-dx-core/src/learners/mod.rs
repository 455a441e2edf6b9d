//! Tree-ensemble base learners.
//!
//! Every learner produces a probability vector spanning the full label set
//! it was fit against; classes missing from the training rows get 0.

mod boosting;
mod forest;
mod tree;

pub use boosting::*;
pub use forest::*;
pub use tree::{Tree, TreeParams};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PipelineConfig;

/// Learner fit errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LearnerError {
    #[error("Empty training set")]
    EmptyTrainingSet,

    #[error("Feature width mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Label {label} out of range for {n_classes} classes")]
    InvalidLabel { label: usize, n_classes: usize },

    #[error("Non-finite feature value at row {row}")]
    NonFiniteFeature { row: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type LearnerResult<T> = Result<T, LearnerError>;

/// Anything that assigns one of `n_classes` labels to a feature row.
pub trait Classifier {
    fn n_classes(&self) -> usize;

    /// Hard prediction.
    fn predict(&self, x: &[f64]) -> usize;

    /// Class probabilities, when the model has a probability interface.
    fn predict_proba(&self, _x: &[f64]) -> Option<Vec<f64>> {
        None
    }
}

/// Probability vector for a row, falling back to a one-hot of the hard prediction.
pub fn probabilities<C: Classifier + ?Sized>(model: &C, x: &[f64]) -> Vec<f64> {
    model
        .predict_proba(x)
        .unwrap_or_else(|| one_hot(model.predict(x), model.n_classes()))
}

pub fn one_hot(index: usize, n_classes: usize) -> Vec<f64> {
    let mut v = vec![0.0; n_classes];
    if let Some(slot) = v.get_mut(index) {
        *slot = 1.0;
    }
    v
}

/// Index of the largest value; ties go to the lowest index.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// `n / (present_classes * count[c])` per row, the usual "balanced" weighting.
pub fn balanced_weights(y: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &label in y {
        if let Some(c) = counts.get_mut(label) {
            *c += 1;
        }
    }
    let present = counts.iter().filter(|c| **c > 0).count().max(1) as f64;
    let n = y.len() as f64;
    y.iter()
        .map(|&label| match counts.get(label) {
            Some(&c) if c > 0 => n / (present * c as f64),
            _ => 0.0,
        })
        .collect()
}

/// Reject training sets no learner can fit.
pub fn check_training_set(x: &[Vec<f64>], y: &[usize], n_classes: usize) -> LearnerResult<usize> {
    if x.is_empty() || y.is_empty() {
        return Err(LearnerError::EmptyTrainingSet);
    }
    if x.len() != y.len() {
        return Err(LearnerError::DimensionMismatch {
            expected: x.len(),
            found: y.len(),
        });
    }
    let width = x[0].len();
    for (row, features) in x.iter().enumerate() {
        if features.len() != width {
            return Err(LearnerError::DimensionMismatch {
                expected: width,
                found: features.len(),
            });
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(LearnerError::NonFiniteFeature { row });
        }
    }
    if let Some(&label) = y.iter().find(|&&l| l >= n_classes) {
        return Err(LearnerError::InvalidLabel { label, n_classes });
    }
    Ok(width)
}

/// The configurable base learner algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerKind {
    RandomForest,
    GradientBoosting,
    /// Balanced sample weights with row subsampling
    WeightedGradientBoosting,
}

impl LearnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearnerKind::RandomForest => "random_forest",
            LearnerKind::GradientBoosting => "gradient_boosting",
            LearnerKind::WeightedGradientBoosting => "weighted_gradient_boosting",
        }
    }

    /// Fit this learner kind with the pipeline's hyperparameters.
    pub fn fit(
        &self,
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        config: &PipelineConfig,
        seed: u64,
    ) -> LearnerResult<BaseLearner> {
        match self {
            LearnerKind::RandomForest => {
                RandomForest::fit(x, y, n_classes, &config.forest, seed)
                    .map(BaseLearner::RandomForest)
            }
            LearnerKind::GradientBoosting => {
                let params = BoostingParams::from(&config.boosting);
                GradientBoosting::fit(x, y, n_classes, &params, seed)
                    .map(BaseLearner::GradientBoosting)
            }
            LearnerKind::WeightedGradientBoosting => {
                let params = BoostingParams::weighted(&config.boosting);
                GradientBoosting::fit(x, y, n_classes, &params, seed)
                    .map(BaseLearner::GradientBoosting)
            }
        }
    }
}

impl std::fmt::Display for LearnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fitted base learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum BaseLearner {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
}

impl Classifier for BaseLearner {
    fn n_classes(&self) -> usize {
        match self {
            BaseLearner::RandomForest(m) => m.n_classes(),
            BaseLearner::GradientBoosting(m) => m.n_classes(),
        }
    }

    fn predict(&self, x: &[f64]) -> usize {
        match self {
            BaseLearner::RandomForest(m) => m.predict(x),
            BaseLearner::GradientBoosting(m) => m.predict(x),
        }
    }

    fn predict_proba(&self, x: &[f64]) -> Option<Vec<f64>> {
        match self {
            BaseLearner::RandomForest(m) => m.predict_proba(x),
            BaseLearner::GradientBoosting(m) => m.predict_proba(x),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_data {
    /// Two well separated blobs per class along feature `class`.
    pub fn blobs(n_classes: usize, per_class: usize, width: usize) -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for c in 0..n_classes {
            for i in 0..per_class {
                let mut row = vec![0.0; width];
                row[c % width] = 5.0 + (i as f64) * 0.1;
                row[(c + 1) % width] += (i % 3) as f64 * 0.05;
                x.push(row);
                y.push(c);
            }
        }
        (x, y)
    }
}
