//! Observation models.

use serde::{Deserialize, Serialize};

/// The nine yes/no symptom observations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomFlags {
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

impl SymptomFlags {
    /// Flags in feature-column order.
    pub fn as_array(&self) -> [bool; 9] {
        [
            self.appetite_loss,
            self.vomiting,
            self.diarrhea,
            self.coughing,
            self.labored_breathing,
            self.lameness,
            self.skin_lesions,
            self.nasal_discharge,
            self.eye_discharge,
        ]
    }

    /// Number of flags set.
    pub fn count(&self) -> usize {
        self.as_array().iter().filter(|b| **b).count()
    }
}

/// A parsed clinical record: attributes, vitals and symptom observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalRecord {
    /// Species (e.g., "Dog", "Cow")
    pub species: String,
    pub breed: String,
    pub sex: String,
    /// Age in years
    pub age: f64,
    /// Weight in kg
    pub weight: f64,
    /// Free-text symptom slots ("NA" when empty)
    pub symptoms: [String; 4],
    pub duration_days: f64,
    /// Body temperature in °C
    pub temperature: f64,
    /// Heart rate in bpm
    pub heart_rate: f64,
    pub flags: SymptomFlags,
    /// Which vitals were imputed from dataset medians
    pub imputed: ImputedFields,
}

/// A single immutable training observation with its ground-truth diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub record: ClinicalRecord,
    /// Diagnosis as recorded
    pub disease: String,
}

impl Sample {
    pub fn species(&self) -> &str {
        &self.record.species
    }
}

/// Record of the fields filled in from dataset medians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImputedFields {
    pub duration: bool,
    pub temperature: bool,
    pub heart_rate: bool,
}

impl ImputedFields {
    pub fn any(&self) -> bool {
        self.duration || self.temperature || self.heart_rate
    }
}

/// Raw, unvalidated observation as submitted at prediction time.
///
/// Vital fields are free text and may be missing; they go through the same
/// parsing as training rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub species: String,
    pub breed: Option<String>,
    pub sex: Option<String>,
    /// Years. Missing is read as `0.0`, as blank training cells are, which
    /// sets the young-animal risk indicator.
    pub age: Option<f64>,
    /// Kilograms. Missing is read as `0.0` and sets the small-animal indicator.
    pub weight: Option<f64>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    /// e.g. "5 days", "2 weeks", "7"
    pub duration: Option<String>,
    /// e.g. "39.8°C", "38.5"
    pub temperature: Option<String>,
    pub heart_rate: Option<String>,
    #[serde(default)]
    pub flags: SymptomFlags,
}

impl Observation {
    /// Create an observation for a species with no findings recorded.
    pub fn new(species: impl Into<String>) -> Self {
        Self {
            species: species.into(),
            ..Default::default()
        }
    }
}
