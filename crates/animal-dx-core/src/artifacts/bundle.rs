//! Trained model bundles, as held in memory and persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::{CategoricalEncoders, ImputationDefaults, LabelEncoder, StandardScaler};
use crate::learners::{Classifier, LearnerKind};
use crate::models::{BundleKind, Syndrome};
use crate::training::{average_probabilities, CalibratedModel};

/// Stage-1 classifier for one species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyndromeModel {
    pub classifier: CalibratedModel,
    /// Syndrome names ("GI", "Respiratory", ...) in class-index order
    pub encoder: LabelEncoder,
    pub scaler: StandardScaler,
}

impl SyndromeModel {
    /// Calibrated syndrome probabilities for an unscaled feature row.
    pub fn predict_proba(&self, features: &[f64]) -> Vec<f64> {
        let scaled = self.scaler.transform(features);
        crate::learners::probabilities(&self.classifier, &scaled)
    }
}

/// One calibrated base learner inside a disease ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleMember {
    pub learner: LearnerKind,
    pub model: CalibratedModel,
}

impl Classifier for EnsembleMember {
    fn n_classes(&self) -> usize {
        self.model.n_classes()
    }

    fn predict(&self, x: &[f64]) -> usize {
        self.model.predict(x)
    }

    fn predict_proba(&self, x: &[f64]) -> Option<Vec<f64>> {
        self.model.predict_proba(x)
    }
}

/// Stage-2 ensemble for one (species, syndrome) group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseEnsemble {
    pub members: Vec<EnsembleMember>,
    /// Disease labels of this group only
    pub encoder: LabelEncoder,
    pub scaler: StandardScaler,
}

impl DiseaseEnsemble {
    /// Mean member probabilities over the group's labels for an unscaled row.
    pub fn predict_proba(&self, features: &[f64]) -> Vec<f64> {
        let scaled = self.scaler.transform(features);
        average_probabilities(&self.members, &scaled)
    }
}

/// What answers stage 2 for one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiseaseBundle {
    /// Single-label group
    Trivial { disease: String, confidence: f64 },
    /// No usable model; answers "Other"
    Fallback { confidence: f64 },
    Ensemble(DiseaseEnsemble),
}

impl DiseaseBundle {
    pub fn kind(&self) -> BundleKind {
        match self {
            DiseaseBundle::Trivial { .. } => BundleKind::Trivial,
            DiseaseBundle::Fallback { .. } => BundleKind::Fallback,
            DiseaseBundle::Ensemble(_) => BundleKind::Ensemble,
        }
    }

    pub fn members(&self) -> usize {
        match self {
            DiseaseBundle::Ensemble(e) => e.members.len(),
            _ => 0,
        }
    }
}

/// Identifies one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub trained_at: DateTime<Utc>,
}

impl RunInfo {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            trained_at: Utc::now(),
        }
    }
}

impl Default for RunInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything inference needs for one species.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesArtifacts {
    pub species: String,
    pub syndrome_model: SyndromeModel,
    pub disease_bundles: BTreeMap<Syndrome, DiseaseBundle>,
    pub encoders: CategoricalEncoders,
    pub feature_columns: Vec<String>,
    pub imputation: ImputationDefaults,
    pub top_k: usize,
    pub run: RunInfo,
}

impl SpeciesArtifacts {
    /// Bundle for `syndrome`, else the Multi bundle, else any bundle.
    pub fn resolve_bundle(&self, syndrome: Syndrome) -> Option<(Syndrome, &DiseaseBundle)> {
        self.disease_bundles
            .get(&syndrome)
            .map(|b| (syndrome, b))
            .or_else(|| self.disease_bundles.get(&Syndrome::Multi).map(|b| (Syndrome::Multi, b)))
            .or_else(|| self.disease_bundles.iter().next().map(|(s, b)| (*s, b)))
    }
}
