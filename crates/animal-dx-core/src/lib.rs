//! Animal-DX Core Library
//!
//! Hierarchical syndrome → disease prediction for livestock and companion animals.
//!
//! # Architecture
//!
//! ```text
//!  Training (offline, per species, sequential)
//!
//!  CSV → Dataset (parse, fail-closed rows, median imputation)
//!              │
//!      Label Consolidator (rare labels → "Other")
//!              │
//!      ┌───────┴──────────────────────────┐
//!      │                                  │
//!      ▼                                  ▼
//!  Syndrome Trainer               per (species, syndrome) group
//!  partition → scale → forest     partition → scale → balance
//!  → calibrate → evaluate         → learners → calibrate → evaluate
//!      │                                  │
//!      └───────────────┬──────────────────┘
//!                      ▼
//!              ArtifactStore (JSON + SHA-256 manifest)
//!
//!  Inference (read-only, concurrent)
//!
//!  Observation → Normalizer → syndrome model → disease bundle → Prediction
//!                 (ModelRegistry snapshot, swapped atomically on reload)
//! ```
//!
//! # Core Principle
//!
//! **Group-level failures never stop the pipeline.** Every stage returns a
//! [`training::StageOutcome`] and degraded groups are recorded in the report.
//!
//! # Modules
//!
//! - [`config`]: TOML pipeline configuration
//! - [`dataset`]: CSV loading and row validation
//! - [`features`]: Normalizer, encoders, derived indicators, scaler
//! - [`learners`]: Random forest and gradient boosting
//! - [`training`]: Consolidation, partitioning, balancing, calibration, evaluation
//! - [`artifacts`]: Persisted bundles and the model registry
//! - [`inference`]: Two-stage inference cascade

pub mod artifacts;
pub mod config;
pub mod dataset;
pub mod features;
pub mod inference;
pub mod learners;
pub mod models;
pub mod training;

// Re-export commonly used types
pub use artifacts::{ArtifactStore, ModelRegistry, ModelSet, SpeciesArtifacts};
pub use config::PipelineConfig;
pub use dataset::Dataset;
pub use inference::{InferenceCascade, PredictionError};
pub use models::{
    BundleKind, ConditionSeverity, GroupKey, Observation, Prediction, RankedDisease, Sample,
    SymptomFlags, Syndrome,
};
pub use training::{Trainer, TrainingOutput, TrainingReport};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum AnimalDxError {
    #[error("Artifact error: {0}")]
    ArtifactError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Dataset error: {0}")]
    DatasetError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Prediction error: {0}")]
    PredictionError(String),
}

impl From<artifacts::ArtifactError> for AnimalDxError {
    fn from(e: artifacts::ArtifactError) -> Self {
        AnimalDxError::ArtifactError(e.to_string())
    }
}

impl From<config::ConfigError> for AnimalDxError {
    fn from(e: config::ConfigError) -> Self {
        AnimalDxError::ConfigError(e.to_string())
    }
}

impl From<dataset::DatasetError> for AnimalDxError {
    fn from(e: dataset::DatasetError) -> Self {
        AnimalDxError::DatasetError(e.to_string())
    }
}

impl From<training::TrainingError> for AnimalDxError {
    fn from(e: training::TrainingError) -> Self {
        AnimalDxError::TrainingError(e.to_string())
    }
}

impl From<inference::PredictionError> for AnimalDxError {
    fn from(e: inference::PredictionError) -> Self {
        AnimalDxError::PredictionError(e.to_string())
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Load every species under a models directory.
#[uniffi::export]
pub fn open_models(path: String) -> Result<Arc<AnimalDx>, AnimalDxError> {
    let store = ArtifactStore::new(path);
    let models = store.load_all()?;
    Ok(Arc::new(AnimalDx {
        store,
        registry: ModelRegistry::new(models),
    }))
}

/// Train from a CSV file and write artifacts under `models_path`.
#[uniffi::export]
pub fn train_models(
    data_path: String,
    models_path: String,
    config_path: Option<String>,
) -> Result<FfiTrainingSummary, AnimalDxError> {
    let config = match config_path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let dataset = Dataset::from_path(&data_path)?;
    let output = Trainer::new(config)?.train(&dataset)?;
    let store = ArtifactStore::new(models_path);
    for artifacts in output.artifacts.values() {
        store.save(artifacts)?;
    }
    Ok(output.report.into())
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe predictor for FFI.
#[derive(uniffi::Object)]
pub struct AnimalDx {
    store: ArtifactStore,
    registry: ModelRegistry,
}

#[uniffi::export]
impl AnimalDx {
    /// Species with loaded artifacts, sorted.
    pub fn available_species(&self) -> Vec<String> {
        self.registry.snapshot().species_names()
    }

    /// Predict a disease. Failures come back as a structured outcome.
    pub fn predict(&self, observation: FfiObservation) -> FfiPredictionOutcome {
        let cascade = InferenceCascade::new(self.registry.snapshot());
        match cascade.predict(&observation.into()) {
            Ok(prediction) => FfiPredictionOutcome::Success {
                prediction: prediction.into(),
            },
            Err(e) => e.into(),
        }
    }

    /// Re-read the models directory and swap in the new set.
    pub fn reload(&self) -> Result<u32, AnimalDxError> {
        Ok(self.registry.reload(&self.store)? as u32)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe symptom flags.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiSymptomFlags {
    pub appetite_loss: bool,
    pub vomiting: bool,
    pub diarrhea: bool,
    pub coughing: bool,
    pub labored_breathing: bool,
    pub lameness: bool,
    pub skin_lesions: bool,
    pub nasal_discharge: bool,
    pub eye_discharge: bool,
}

impl From<FfiSymptomFlags> for SymptomFlags {
    fn from(f: FfiSymptomFlags) -> Self {
        SymptomFlags {
            appetite_loss: f.appetite_loss,
            vomiting: f.vomiting,
            diarrhea: f.diarrhea,
            coughing: f.coughing,
            labored_breathing: f.labored_breathing,
            lameness: f.lameness,
            skin_lesions: f.skin_lesions,
            nasal_discharge: f.nasal_discharge,
            eye_discharge: f.eye_discharge,
        }
    }
}

/// FFI-safe observation.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiObservation {
    pub species: String,
    pub breed: Option<String>,
    pub sex: Option<String>,
    pub age: Option<f64>,
    pub weight: Option<f64>,
    pub symptoms: Vec<String>,
    pub duration: Option<String>,
    pub temperature: Option<String>,
    pub heart_rate: Option<String>,
    pub flags: FfiSymptomFlags,
}

impl From<FfiObservation> for Observation {
    fn from(obs: FfiObservation) -> Self {
        Observation {
            species: obs.species,
            breed: obs.breed,
            sex: obs.sex,
            age: obs.age,
            weight: obs.weight,
            symptoms: obs.symptoms,
            duration: obs.duration,
            temperature: obs.temperature,
            heart_rate: obs.heart_rate,
            flags: obs.flags.into(),
        }
    }
}

/// FFI-safe ranked disease.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRankedDisease {
    pub disease: String,
    pub probability: f64,
}

impl From<RankedDisease> for FfiRankedDisease {
    fn from(r: RankedDisease) -> Self {
        Self {
            disease: r.disease,
            probability: r.probability,
        }
    }
}

/// FFI-safe prediction.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrediction {
    pub species: String,
    pub predicted_disease: String,
    pub confidence: f64,
    pub top_predictions: Vec<FfiRankedDisease>,
    pub syndrome: String,
    pub syndrome_confidence: f64,
    pub resolved_syndrome: String,
    pub bundle_kind: String,
    pub disease_confidence: f64,
    pub temperature_status: String,
    pub heart_rate_status: String,
    pub fever_severity: f64,
    pub hr_severity: f64,
    pub respiratory_score: f64,
    pub gi_score: f64,
    pub systemic_score: f64,
    pub dermatological_score: f64,
    pub neurological_score: f64,
    pub multi_system: bool,
    pub condition_severity: String,
}

impl From<Prediction> for FfiPrediction {
    fn from(p: Prediction) -> Self {
        let scores = p.syndrome_analysis.scores;
        Self {
            species: p.species,
            predicted_disease: p.predicted_disease,
            confidence: p.confidence,
            top_predictions: p.top_predictions.into_iter().map(|r| r.into()).collect(),
            syndrome: p.syndrome.to_string(),
            syndrome_confidence: p.syndrome_confidence,
            resolved_syndrome: p.resolved_syndrome.to_string(),
            bundle_kind: format!("{:?}", p.bundle_kind),
            disease_confidence: p.disease_confidence,
            temperature_status: format!("{:?}", p.vital_signs.temperature_status),
            heart_rate_status: format!("{:?}", p.vital_signs.heart_rate_status),
            fever_severity: p.vital_signs.fever_severity,
            hr_severity: p.vital_signs.hr_severity,
            respiratory_score: scores.respiratory,
            gi_score: scores.gi,
            systemic_score: scores.systemic,
            dermatological_score: scores.dermatological,
            neurological_score: scores.neurological,
            multi_system: p.syndrome_analysis.multi_system,
            condition_severity: p.condition_severity.as_str().to_string(),
        }
    }
}

/// Result of a prediction request.
#[derive(Debug, Clone, uniffi::Enum)]
pub enum FfiPredictionOutcome {
    Success {
        prediction: FfiPrediction,
    },
    Failure {
        message: String,
        available_species: Vec<String>,
        suggestion: Option<String>,
    },
}

impl From<PredictionError> for FfiPredictionOutcome {
    fn from(e: PredictionError) -> Self {
        let available_species = e.available_species().to_vec();
        let suggestion = match &e {
            PredictionError::UnknownSpecies { suggestion, .. } => suggestion.clone(),
            _ => None,
        };
        FfiPredictionOutcome::Failure {
            message: e.to_string(),
            available_species,
            suggestion,
        }
    }
}

/// FFI-safe training summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTrainingSummary {
    pub run_id: String,
    pub samples: u32,
    pub rejected_rows: u32,
    pub trained_species: Vec<String>,
    pub skipped_species: Vec<String>,
    pub degradations: u32,
}

impl From<TrainingReport> for FfiTrainingSummary {
    fn from(report: TrainingReport) -> Self {
        Self {
            trained_species: report.trained_species().into_iter().map(String::from).collect(),
            skipped_species: report.skipped.iter().map(|s| s.species.clone()).collect(),
            degradations: report.degradations().count() as u32,
            samples: report.samples as u32,
            rejected_rows: report.rejected_rows.len() as u32,
            run_id: report.run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_species_outcome() {
        let err = PredictionError::UnknownSpecies {
            species: "Llama".into(),
            available: vec!["Cow".into(), "Dog".into()],
            suggestion: None,
        };
        match FfiPredictionOutcome::from(err) {
            FfiPredictionOutcome::Failure {
                available_species,
                suggestion,
                ..
            } => {
                assert_eq!(available_species, vec!["Cow", "Dog"]);
                assert!(suggestion.is_none());
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_open_empty_models_dir() {
        let dir = tempfile::tempdir().unwrap();
        let dx = open_models(dir.path().to_string_lossy().into_owned()).unwrap();
        assert!(dx.available_species().is_empty());

        let outcome = dx.predict(FfiObservation {
            species: "Dog".into(),
            breed: None,
            sex: None,
            age: None,
            weight: None,
            symptoms: Vec::new(),
            duration: None,
            temperature: None,
            heart_rate: None,
            flags: FfiSymptomFlags::default(),
        });
        assert!(matches!(outcome, FfiPredictionOutcome::Failure { .. }));
        assert_eq!(dx.reload().unwrap(), 0);
    }
}
