//! Label encoders and the ordered feature vector.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::ClinicalFeatures;
use crate::models::{ClinicalRecord, ConditionSeverity};

/// Maps string labels to dense indices (sorted lexicographically).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit on the unique values of `labels`.
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = labels.into_iter().map(|s| s.as_ref().to_string()).collect();
        Self {
            classes: unique.into_iter().collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Index of a known label.
    pub fn encode(&self, label: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .ok()
    }

    /// Index of a label, with unknown labels mapped to 0.
    pub fn encode_or_default(&self, label: &str) -> usize {
        self.encode(label).unwrap_or(0)
    }

    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}

/// Encoders for the categorical inputs.
///
/// Fit once over the whole dataset and shared by every species.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoders {
    pub breed: LabelEncoder,
    pub sex: LabelEncoder,
    pub symptoms: [LabelEncoder; 4],
}

impl CategoricalEncoders {
    pub fn fit<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ClinicalRecord> + Clone,
    {
        let slot = |i: usize| {
            LabelEncoder::fit(records.clone().into_iter().map(|r| r.symptoms[i].as_str()))
        };
        Self {
            breed: LabelEncoder::fit(records.clone().into_iter().map(|r| r.breed.as_str())),
            sex: LabelEncoder::fit(records.clone().into_iter().map(|r| r.sex.as_str())),
            symptoms: [slot(0), slot(1), slot(2), slot(3)],
        }
    }
}

/// Ordered feature columns shared by every model.
pub const FEATURE_COLUMNS: [&str; 36] = [
    "Breed",
    "Age",
    "Gender",
    "Weight",
    "Symptom_1",
    "Symptom_2",
    "Symptom_3",
    "Symptom_4",
    "Duration_days",
    "Body_Temperature",
    "Heart_Rate",
    "Appetite_Loss",
    "Vomiting",
    "Diarrhea",
    "Coughing",
    "Labored_Breathing",
    "Lameness",
    "Skin_Lesions",
    "Nasal_Discharge",
    "Eye_Discharge",
    "Temp_Abnormal",
    "HR_Abnormal",
    "Fever_Severity",
    "HR_Severity",
    "Respiratory_Syndrome",
    "GI_Syndrome",
    "Systemic_Syndrome",
    "Dermatological_Syndrome",
    "Neurological_Syndrome",
    "Acute_Condition",
    "Chronic_Condition",
    "Multi_System_Disease",
    "Young_Animal",
    "Senior_Animal",
    "Small_Animal",
    "Large_Animal",
];

pub fn feature_columns() -> Vec<String> {
    FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn indicator(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Encode a record into the unscaled feature vector, in [`FEATURE_COLUMNS`] order.
pub fn feature_vector(record: &ClinicalRecord, encoders: &CategoricalEncoders) -> Vec<f64> {
    let derived = ClinicalFeatures::derive(record);
    let mut row = Vec::with_capacity(FEATURE_COLUMNS.len());

    row.push(encoders.breed.encode_or_default(&record.breed) as f64);
    row.push(record.age);
    row.push(encoders.sex.encode_or_default(&record.sex) as f64);
    row.push(record.weight);
    for (encoder, symptom) in encoders.symptoms.iter().zip(&record.symptoms) {
        row.push(encoder.encode_or_default(symptom) as f64);
    }
    row.push(record.duration_days);
    row.push(record.temperature);
    row.push(record.heart_rate);
    row.extend(record.flags.as_array().iter().map(|b| indicator(*b)));

    row.push(f64::from(derived.vitals.temperature_status.sign()));
    row.push(f64::from(derived.vitals.heart_rate_status.sign()));
    row.push(derived.vitals.fever_severity);
    row.push(derived.vitals.hr_severity);
    row.push(derived.scores.respiratory);
    row.push(derived.scores.gi);
    row.push(derived.scores.systemic);
    row.push(derived.scores.dermatological);
    row.push(derived.scores.neurological);
    row.push(indicator(derived.severity == ConditionSeverity::Acute));
    row.push(indicator(derived.severity == ConditionSeverity::Chronic));
    row.push(indicator(derived.multi_system));
    row.push(indicator(derived.young));
    row.push(indicator(derived.senior));
    row.push(indicator(derived.small));
    row.push(indicator(derived.large));

    row
}
