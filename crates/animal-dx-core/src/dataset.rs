//! Tabular training dataset loader.
//!
//! Handles:
//! - CSV column mapping for the clinical survey layout
//! - Fail-closed row validation (rejections are collected, not fatal)
//! - Dataset-wide median imputation of duration and vitals

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::features::normalizer::{
    normalize_category, parse_duration_days, parse_flag, parse_heart_rate, parse_temperature,
    symptom_slots,
};
use crate::features::{ImputationDefaults, PendingRecord};
use crate::models::{Sample, SymptomFlags};

/// Dataset errors. Individual bad rows are not errors; see [`RowRejection`].
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Dataset has no usable rows ({rejected} rejected)")]
    Empty { rejected: usize },
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// One CSV row as written by the survey export.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "Animal_Type", default)]
    pub animal_type: Option<String>,
    #[serde(rename = "Breed", default)]
    pub breed: Option<String>,
    #[serde(rename = "Age", default)]
    pub age: Option<String>,
    #[serde(rename = "Gender", default)]
    pub gender: Option<String>,
    #[serde(rename = "Weight", default)]
    pub weight: Option<String>,
    #[serde(rename = "Symptom_1", default)]
    pub symptom_1: Option<String>,
    #[serde(rename = "Symptom_2", default)]
    pub symptom_2: Option<String>,
    #[serde(rename = "Symptom_3", default)]
    pub symptom_3: Option<String>,
    #[serde(rename = "Symptom_4", default)]
    pub symptom_4: Option<String>,
    #[serde(rename = "Duration", default)]
    pub duration: Option<String>,
    #[serde(rename = "Body_Temperature", default)]
    pub body_temperature: Option<String>,
    #[serde(rename = "Heart_Rate", default)]
    pub heart_rate: Option<String>,
    #[serde(rename = "Appetite_Loss", default)]
    pub appetite_loss: Option<String>,
    #[serde(rename = "Vomiting", default)]
    pub vomiting: Option<String>,
    #[serde(rename = "Diarrhea", default)]
    pub diarrhea: Option<String>,
    #[serde(rename = "Coughing", default)]
    pub coughing: Option<String>,
    #[serde(rename = "Labored_Breathing", default)]
    pub labored_breathing: Option<String>,
    #[serde(rename = "Lameness", default)]
    pub lameness: Option<String>,
    #[serde(rename = "Skin_Lesions", default)]
    pub skin_lesions: Option<String>,
    #[serde(rename = "Nasal_Discharge", default)]
    pub nasal_discharge: Option<String>,
    #[serde(rename = "Eye_Discharge", default)]
    pub eye_discharge: Option<String>,
    #[serde(rename = "Disease_Prediction", default)]
    pub disease: Option<String>,
}

/// A row excluded from training, with the first field that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRejection {
    /// 1-based data row (header excluded)
    pub row: usize,
    pub field: String,
    pub reason: String,
}

impl RowRejection {
    fn new(row: usize, field: &str, reason: impl Into<String>) -> Self {
        Self {
            row,
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Empty → 0.0, non-numeric → rejection.
fn parse_numeric(row: usize, field: &str, value: &Option<String>) -> Result<f64, RowRejection> {
    match present(value) {
        None => Ok(0.0),
        Some(text) => text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| RowRejection::new(row, field, format!("not a number: {:?}", text))),
    }
}

/// Empty → false, unrecognised → rejection.
fn parse_flag_field(row: usize, field: &str, value: &Option<String>) -> Result<bool, RowRejection> {
    match present(value) {
        None => Ok(false),
        Some(text) => parse_flag(text).ok_or_else(|| {
            RowRejection::new(row, field, format!("not a yes/no value: {:?}", text))
        }),
    }
}

impl RawRecord {
    /// Validate and parse one row. Vitals that fail to parse stay `None` for imputation.
    pub fn parse(&self, row: usize) -> Result<(PendingRecord, String), RowRejection> {
        let species = present(&self.animal_type)
            .ok_or_else(|| RowRejection::new(row, "Animal_Type", "missing species"))?;
        let disease = present(&self.disease)
            .ok_or_else(|| RowRejection::new(row, "Disease_Prediction", "missing disease label"))?;

        let age = parse_numeric(row, "Age", &self.age)?;
        let weight = parse_numeric(row, "Weight", &self.weight)?;

        let flags = SymptomFlags {
            appetite_loss: parse_flag_field(row, "Appetite_Loss", &self.appetite_loss)?,
            vomiting: parse_flag_field(row, "Vomiting", &self.vomiting)?,
            diarrhea: parse_flag_field(row, "Diarrhea", &self.diarrhea)?,
            coughing: parse_flag_field(row, "Coughing", &self.coughing)?,
            labored_breathing: parse_flag_field(row, "Labored_Breathing", &self.labored_breathing)?,
            lameness: parse_flag_field(row, "Lameness", &self.lameness)?,
            skin_lesions: parse_flag_field(row, "Skin_Lesions", &self.skin_lesions)?,
            nasal_discharge: parse_flag_field(row, "Nasal_Discharge", &self.nasal_discharge)?,
            eye_discharge: parse_flag_field(row, "Eye_Discharge", &self.eye_discharge)?,
        };

        let symptoms: Vec<&str> = [
            &self.symptom_1,
            &self.symptom_2,
            &self.symptom_3,
            &self.symptom_4,
        ]
        .iter()
        .map(|s| s.as_deref().unwrap_or(""))
        .collect();

        let pending = PendingRecord {
            species: species.to_string(),
            breed: normalize_category(self.breed.as_deref()),
            sex: normalize_category(self.gender.as_deref()),
            age,
            weight,
            symptoms: symptom_slots(&symptoms),
            duration_days: present(&self.duration).and_then(parse_duration_days),
            temperature: present(&self.body_temperature).and_then(parse_temperature),
            heart_rate: present(&self.heart_rate).and_then(parse_heart_rate),
            flags,
        };
        Ok((pending, disease.to_string()))
    }
}

/// Validated training samples plus what was rejected along the way.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub samples: Vec<Sample>,
    pub rejected: Vec<RowRejection>,
    /// Medians used to fill missing values, persisted for inference
    pub defaults: ImputationDefaults,
}

impl Dataset {
    /// Load a CSV file.
    pub fn from_path(path: impl AsRef<Path>) -> DatasetResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading dataset");
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Load CSV from any reader. Rows failing validation are collected in `rejected`.
    pub fn from_reader<R: Read>(reader: R) -> DatasetResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut parsed = Vec::new();
        let mut rejected = Vec::new();
        for (i, result) in csv_reader.deserialize::<RawRecord>().enumerate() {
            let row = i + 1;
            let raw = match result {
                Ok(raw) => raw,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    rejected.push(RowRejection::new(row, "row", e.to_string()));
                    continue;
                }
            };
            match raw.parse(row) {
                Ok(pair) => parsed.push(pair),
                Err(rejection) => rejected.push(rejection),
            }
        }

        for r in &rejected {
            warn!(row = r.row, field = %r.field, reason = %r.reason, "Rejected dataset row");
        }
        if parsed.is_empty() {
            return Err(DatasetError::Empty {
                rejected: rejected.len(),
            });
        }

        let dataset = Self::from_pending(parsed, rejected);
        info!(
            samples = dataset.samples.len(),
            rejected = dataset.rejected.len(),
            "Dataset loaded"
        );
        Ok(dataset)
    }

    /// Impute and finalize parsed rows.
    pub fn from_pending(parsed: Vec<(PendingRecord, String)>, rejected: Vec<RowRejection>) -> Self {
        let pending: Vec<PendingRecord> = parsed.iter().map(|(p, _)| p.clone()).collect();
        let defaults = ImputationDefaults::from_pending(&pending);
        debug!(
            duration_days = defaults.duration_days,
            temperature = defaults.temperature,
            heart_rate = defaults.heart_rate,
            "Imputation medians"
        );

        let samples = parsed
            .into_iter()
            .map(|(p, disease)| Sample {
                record: p.complete(&defaults),
                disease,
            })
            .collect();

        Self {
            samples,
            rejected,
            defaults,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
