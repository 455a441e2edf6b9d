//! Prediction result models returned by the inference cascade.

use serde::{Deserialize, Serialize};

use super::{ConditionSeverity, Syndrome, SyndromeScores};

/// One entry in the ranked disease list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedDisease {
    pub disease: String,
    pub probability: f64,
}

/// Which kind of disease bundle answered the request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BundleKind {
    Ensemble,
    Trivial,
    Fallback,
}

/// Signed vital sign status relative to the species range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VitalStatus {
    Low,
    Normal,
    High,
}

impl VitalStatus {
    /// -1 below range, 0 within, +1 above.
    pub fn sign(&self) -> i8 {
        match self {
            VitalStatus::Low => -1,
            VitalStatus::Normal => 0,
            VitalStatus::High => 1,
        }
    }
}

/// Vital sign analysis attached to every prediction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VitalSignsAnalysis {
    pub temperature_status: VitalStatus,
    pub heart_rate_status: VitalStatus,
    /// |°C outside range| / 2
    pub fever_severity: f64,
    /// Fractional excess/deficit relative to the violated bound
    pub hr_severity: f64,
}

/// Rule-based syndrome breakdown attached to every prediction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyndromeAnalysis {
    pub scores: SyndromeScores,
    /// Label the scoring rule assigns (independent of the classifier)
    pub rule_label: Syndrome,
    pub multi_system: bool,
}

/// Final result of the two-stage cascade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub species: String,
    pub predicted_disease: String,
    /// Compound confidence (disease × syndrome for ensembles, fixed otherwise)
    pub confidence: f64,
    pub top_predictions: Vec<RankedDisease>,
    /// Stage-1 argmax
    pub syndrome: Syndrome,
    pub syndrome_confidence: f64,
    /// Bundle actually used after Multi/any fallback
    pub resolved_syndrome: Syndrome,
    pub bundle_kind: BundleKind,
    /// Stage-2 confidence before compounding
    pub disease_confidence: f64,
    pub vital_signs: VitalSignsAnalysis,
    pub syndrome_analysis: SyndromeAnalysis,
    pub condition_severity: ConditionSeverity,
}

impl Prediction {
    /// Whether the compound confidence reflects a learned ensemble.
    pub fn is_learned(&self) -> bool {
        self.bundle_kind == BundleKind::Ensemble
    }
}
