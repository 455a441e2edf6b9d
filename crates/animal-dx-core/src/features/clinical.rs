//! Species-relative vital assessment and derived clinical indicators.

use serde::{Deserialize, Serialize};

use crate::models::{
    ClinicalRecord, ConditionSeverity, SpeciesProfile, Syndrome, SyndromeAnalysis,
    SyndromeScores, VitalSignsAnalysis, VitalStatus,
};

/// Assess temperature and heart rate against the species' normal range.
pub fn assess_vitals(species: &str, temperature: f64, heart_rate: f64) -> VitalSignsAnalysis {
    let profile = SpeciesProfile::for_species(species);

    let (temperature_status, fever_severity) = if temperature > profile.temp_high {
        (VitalStatus::High, (temperature - profile.temp_high) / 2.0)
    } else if temperature < profile.temp_low {
        (VitalStatus::Low, (profile.temp_low - temperature) / 2.0)
    } else {
        (VitalStatus::Normal, 0.0)
    };

    let (heart_rate_status, hr_severity) = if heart_rate > profile.hr_high {
        (VitalStatus::High, (heart_rate - profile.hr_high) / profile.hr_high)
    } else if heart_rate < profile.hr_low {
        (VitalStatus::Low, (profile.hr_low - heart_rate) / profile.hr_low)
    } else {
        (VitalStatus::Normal, 0.0)
    };

    VitalSignsAnalysis {
        temperature_status,
        heart_rate_status,
        fever_severity,
        hr_severity,
    }
}

/// Everything derived from a clinical record without learned parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalFeatures {
    pub vitals: VitalSignsAnalysis,
    pub scores: SyndromeScores,
    pub syndrome: Syndrome,
    pub severity: ConditionSeverity,
    pub multi_system: bool,
    pub young: bool,
    pub senior: bool,
    pub small: bool,
    pub large: bool,
}

impl ClinicalFeatures {
    pub fn derive(record: &ClinicalRecord) -> Self {
        let vitals = assess_vitals(&record.species, record.temperature, record.heart_rate);
        let scores = SyndromeScores::compute(&record.flags, vitals.temperature_status.sign());
        Self {
            syndrome: scores.label(),
            multi_system: scores.multi_system(),
            severity: ConditionSeverity::from_duration_days(record.duration_days),
            young: record.age < 2.0,
            senior: record.age > 8.0,
            small: record.weight < 30.0,
            large: record.weight > 200.0,
            vitals,
            scores,
        }
    }

    pub fn syndrome_analysis(&self) -> SyndromeAnalysis {
        SyndromeAnalysis {
            scores: self.scores,
            rule_label: self.syndrome,
            multi_system: self.multi_system,
        }
    }
}
