//! Offline training pipeline.
//!
//! Pipeline: Dataset → consolidate per species → syndrome classifier
//! → per-syndrome disease bundles → SpeciesArtifacts
//!
//! Species and syndromes are processed in sorted order with seeds derived
//! from the configured seed, so a re-run on the same data reproduces the
//! same splits, resampling and models.

mod balance;
mod calibration;
mod consolidator;
mod disease_trainer;
mod evaluation;
mod outcome;
mod partition;
mod report;
mod syndrome_trainer;

pub use balance::*;
pub use calibration::*;
pub use consolidator::*;
pub use disease_trainer::*;
pub use evaluation::*;
pub use outcome::*;
pub use partition::*;
pub use report::*;
pub use syndrome_trainer::*;

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::artifacts::{RunInfo, SpeciesArtifacts};
use crate::config::{ConfigError, PipelineConfig};
use crate::dataset::Dataset;
use crate::features::{feature_columns, CategoricalEncoders, ClinicalFeatures};
use crate::models::{GroupKey, Sample, Syndrome};

/// Training errors. Group-level problems are degradations, not errors.
#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dataset is empty")]
    EmptyDataset,

    #[error("No species had enough samples to train ({skipped} skipped)")]
    NothingTrained { skipped: usize },
}

pub type TrainingResult<T> = Result<T, TrainingError>;

/// Deterministic per-group seed.
pub fn group_seed(seed: u64, species: &str, stage: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(species.as_bytes());
    hasher.update([0u8]);
    hasher.update(stage.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Trained models for every species plus the run report.
#[derive(Debug, Clone)]
pub struct TrainingOutput {
    pub artifacts: BTreeMap<String, SpeciesArtifacts>,
    pub report: TrainingReport,
}

pub struct Trainer {
    config: PipelineConfig,
}

impl Trainer {
    pub fn new(config: PipelineConfig) -> TrainingResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline over a loaded dataset.
    pub fn train(&self, dataset: &Dataset) -> TrainingResult<TrainingOutput> {
        if dataset.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }
        let run = RunInfo::new();
        info!(run_id = %run.run_id, samples = dataset.len(), "Starting training run");

        let encoders = CategoricalEncoders::fit(dataset.samples.iter().map(|s| &s.record));
        let consolidator = LabelConsolidator::new(self.config.training.rare_label_threshold);

        let mut report = TrainingReport {
            run_id: run.run_id.clone(),
            seed: self.config.training.seed,
            samples: dataset.len(),
            species: Vec::new(),
            skipped: Vec::new(),
            rejected_rows: dataset.rejected.clone(),
        };
        let mut artifacts = BTreeMap::new();

        for (species, samples) in group_by_species(dataset.samples.clone()) {
            let (samples, consolidation) = consolidator.consolidate(&species, samples);

            let syndrome = SyndromeTrainer::new(&self.config).train(&species, &samples, &encoders);
            let training = match accept_syndrome_stage(&species, syndrome) {
                Ok(t) => t,
                Err(reason) => {
                    warn!(
                        species = %species,
                        samples = samples.len(),
                        reason = %reason,
                        "Skipping species"
                    );
                    report.skipped.push(SkippedSpecies {
                        species,
                        samples: samples.len(),
                        reason,
                    });
                    continue;
                }
            };

            let mut bundles = BTreeMap::new();
            let mut groups = Vec::new();
            let trainer = DiseaseTrainer::new(&self.config);
            for (syndrome, group) in group_by_syndrome(samples) {
                let key = GroupKey::new(species.clone(), syndrome);
                let (bundle, group_report) = trainer.train(&key, &group, &encoders);
                bundles.insert(syndrome, bundle);
                groups.push(group_report);
            }

            report.species.push(SpeciesReport {
                species: species.clone(),
                consolidation,
                syndrome_evaluation: training.evaluation,
                syndrome_degradations: training.degradations,
                groups,
            });
            artifacts.insert(
                species.clone(),
                SpeciesArtifacts {
                    species,
                    syndrome_model: training.model,
                    disease_bundles: bundles,
                    encoders: encoders.clone(),
                    feature_columns: feature_columns(),
                    imputation: dataset.defaults,
                    top_k: self.config.training.top_k,
                    run: run.clone(),
                },
            );
        }

        if artifacts.is_empty() {
            return Err(TrainingError::NothingTrained {
                skipped: report.skipped.len(),
            });
        }
        info!(
            trained = artifacts.len(),
            skipped = report.skipped.len(),
            degradations = report.degradations().count(),
            "Training run complete"
        );
        Ok(TrainingOutput { artifacts, report })
    }
}

/// Unwrap the syndrome stage, keeping a `Degraded` reason with the training.
/// A fallback becomes the reason the species is skipped.
fn accept_syndrome_stage(
    species: &str,
    outcome: StageOutcome<SyndromeTraining>,
) -> Result<SyndromeTraining, Degradation> {
    match outcome {
        StageOutcome::Ok(training) => Ok(training),
        StageOutcome::Degraded { mut value, reason } => {
            warn!(species, stage = "syndrome", reason = %reason, "Degraded");
            value.degradations.push(reason);
            Ok(value)
        }
        StageOutcome::Fallback { reason } => Err(reason),
    }
}

/// Split samples by their rule-derived syndrome, in canonical syndrome order.
pub fn group_by_syndrome(samples: Vec<Sample>) -> BTreeMap<Syndrome, Vec<Sample>> {
    let mut groups: BTreeMap<Syndrome, Vec<Sample>> = BTreeMap::new();
    for s in samples {
        let syndrome = ClinicalFeatures::derive(&s.record).syndrome;
        groups.entry(syndrome).or_default().push(s);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::SyndromeModel;
    use crate::config::ForestConfig;
    use crate::features::{LabelEncoder, StandardScaler};
    use crate::learners::{BaseLearner, RandomForest};

    fn syndrome_training() -> SyndromeTraining {
        let x = vec![vec![0.0], vec![1.0]];
        let config = ForestConfig {
            n_estimators: 1,
            ..Default::default()
        };
        let forest = RandomForest::fit(&x, &[0, 1], 2, &config, 0).unwrap();
        SyndromeTraining {
            model: SyndromeModel {
                classifier: CalibratedModel::uncalibrated(BaseLearner::RandomForest(forest)),
                encoder: LabelEncoder::fit(["GI", "Multi"]),
                scaler: StandardScaler::fit(&x),
            },
            evaluation: None,
            degradations: vec![Degradation::NoCalibrationData],
        }
    }

    #[test]
    fn test_degraded_syndrome_stage_keeps_reason() {
        let outcome = StageOutcome::degraded(
            syndrome_training(),
            Degradation::Unstratified { split: "test".into() },
        );
        let training = accept_syndrome_stage("Dog", outcome).unwrap();
        assert_eq!(
            training.degradations,
            vec![
                Degradation::NoCalibrationData,
                Degradation::Unstratified { split: "test".into() },
            ]
        );

        let report = TrainingReport {
            run_id: "run".into(),
            seed: 42,
            samples: 10,
            species: vec![SpeciesReport {
                species: "Dog".into(),
                consolidation: LabelConsolidator::default().consolidate("Dog", Vec::new()).1,
                syndrome_evaluation: None,
                syndrome_degradations: training.degradations,
                groups: Vec::new(),
            }],
            skipped: Vec::new(),
            rejected_rows: Vec::new(),
        };
        assert_eq!(report.degradations().count(), 2);
    }

    #[test]
    fn test_syndrome_fallback_becomes_skip_reason() {
        let outcome: StageOutcome<SyndromeTraining> =
            StageOutcome::fallback(Degradation::NoTrainingData);
        let reason = accept_syndrome_stage("Dog", outcome).unwrap_err();
        assert_eq!(reason, Degradation::NoTrainingData);
    }

    #[test]
    fn test_group_seed_is_stable_and_distinct() {
        assert_eq!(group_seed(42, "Dog", "GI"), group_seed(42, "Dog", "GI"));
        assert_ne!(group_seed(42, "Dog", "GI"), group_seed(42, "Dog", "Multi"));
        assert_ne!(group_seed(42, "Dog", "GI"), group_seed(7, "Dog", "GI"));
        // Separator keeps ("ab", "c") and ("a", "bc") apart.
        assert_ne!(group_seed(1, "ab", "c"), group_seed(1, "a", "bc"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.ensemble.learners.clear();
        assert!(matches!(Trainer::new(config), Err(TrainingError::Config(_))));
    }
}
