//! Pipeline configuration.
//!
//! Loaded from TOML; every section and field has a default so an empty
//! file (or no file) yields the standard 70/15/15 pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::learners::LearnerKind;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub training: TrainingConfig,
    pub partition: PartitionConfig,
    pub balance: BalanceConfig,
    pub forest: ForestConfig,
    pub boosting: BoostingConfig,
    pub ensemble: EnsembleConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Seed for every random step (splits, resampling, learners)
    pub seed: u64,
    /// Labels seen fewer times than this per species become "Other"
    pub rare_label_threshold: usize,
    /// Species with fewer samples get no syndrome classifier
    pub min_species_samples: usize,
    pub top_k: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            rare_label_threshold: 3,
            min_species_samples: 8,
            top_k: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub test_fraction: f64,
    pub calibration_fraction: f64,
    /// Groups smaller than this are used for training only
    pub min_split_samples: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.15,
            calibration_fraction: 0.15,
            min_split_samples: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub enabled: bool,
    /// Majority classes are cut to `minority * majority_ratio` (1.0 = full undersampling)
    pub majority_ratio: f64,
    pub smote_k_neighbors: usize,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            majority_ratio: 1.0,
            smote_k_neighbors: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub class_weighted: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 15,
            min_samples_split: 2,
            min_samples_leaf: 1,
            class_weighted: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub subsample: f64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 150,
            learning_rate: 0.1,
            max_depth: 6,
            subsample: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub learners: Vec<LearnerKind>,
    /// Confidence reported by single-label groups
    pub trivial_confidence: f64,
    /// Confidence reported when a group has no usable model
    pub fallback_confidence: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            learners: vec![
                LearnerKind::RandomForest,
                LearnerKind::GradientBoosting,
                LearnerKind::WeightedGradientBoosting,
            ],
            trivial_confidence: 0.95,
            fallback_confidence: 0.2,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        let p = &self.partition;
        for (name, value) in [
            ("partition.test_fraction", p.test_fraction),
            ("partition.calibration_fraction", p.calibration_fraction),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be in [0, 1), got {}",
                    name, value
                )));
            }
        }
        if p.test_fraction + p.calibration_fraction >= 1.0 {
            return Err(ConfigError::Invalid(
                "test_fraction + calibration_fraction must leave room for training".into(),
            ));
        }

        for (name, value) in [
            ("ensemble.trivial_confidence", self.ensemble.trivial_confidence),
            ("ensemble.fallback_confidence", self.ensemble.fallback_confidence),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.ensemble.learners.is_empty() {
            return Err(ConfigError::Invalid("ensemble.learners must not be empty".into()));
        }

        if self.training.top_k == 0 {
            return Err(ConfigError::Invalid("training.top_k must be at least 1".into()));
        }
        if self.balance.majority_ratio < 1.0 {
            return Err(ConfigError::Invalid("balance.majority_ratio must be >= 1.0".into()));
        }
        if self.balance.smote_k_neighbors == 0 {
            return Err(ConfigError::Invalid("balance.smote_k_neighbors must be at least 1".into()));
        }
        if self.forest.n_estimators == 0 || self.boosting.n_estimators == 0 {
            return Err(ConfigError::Invalid("n_estimators must be at least 1".into()));
        }
        if !(self.boosting.subsample > 0.0 && self.boosting.subsample <= 1.0) {
            return Err(ConfigError::Invalid("boosting.subsample must be in (0, 1]".into()));
        }
        if !(self.boosting.learning_rate > 0.0) {
            return Err(ConfigError::Invalid("boosting.learning_rate must be positive".into()));
        }
        Ok(())
    }
}
