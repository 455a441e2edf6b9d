//! Raw field normalizer.
//!
//! Handles:
//! - Free-text durations ("5 days", "2 weeks") → days
//! - Decorated temperatures ("39.8°C") → °C
//! - Heart rates ("110", "110 bpm") → bpm
//! - Yes/no symptom flags
//! - Median imputation of missing vitals

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ClinicalRecord, ImputedFields, Observation, SymptomFlags};

/// Placeholder for empty categorical fields.
pub const MISSING_CATEGORY: &str = "NA";

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("static regex compiles"));

/// Normalization errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid number in {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid yes/no value in {field}: {value:?}")]
    InvalidFlag { field: &'static str, value: String },
}

pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// First numeric token in a string.
fn first_number(text: &str) -> Option<f64> {
    NUMBER
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse a free-text duration into days.
///
/// Takes the first numeric token; a week marker multiplies it by 7.
pub fn parse_duration_days(text: &str) -> Option<f64> {
    let lower = text.trim().to_lowercase();
    let value = first_number(&lower)?;
    if lower.contains("week") || lower.contains("wk") {
        Some(value * 7.0)
    } else {
        Some(value)
    }
}

/// Parse a temperature string, stripping degree and unit markers.
pub fn parse_temperature(text: &str) -> Option<f64> {
    let stripped: String = text
        .chars()
        .filter(|c| !matches!(c, '°' | 'c' | 'C'))
        .collect();
    let stripped = stripped.trim();
    if stripped.is_empty() {
        return None;
    }
    stripped.parse().ok().or_else(|| first_number(stripped))
}

/// Parse a heart rate in bpm.
pub fn parse_heart_rate(text: &str) -> Option<f64> {
    let lower = text.trim().to_lowercase();
    let value = lower.strip_suffix("bpm").unwrap_or(&lower).trim();
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a yes/no flag. Returns `None` for anything unrecognised.
pub fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "yes" | "y" | "true" | "1" => Some(true),
        "no" | "n" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Trimmed categorical value, or [`MISSING_CATEGORY`].
pub fn normalize_category(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => MISSING_CATEGORY.to_string(),
    }
}

/// Median of finite values (mean of the middle pair for even counts).
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Dataset medians used to fill missing duration and vitals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImputationDefaults {
    pub duration_days: f64,
    pub temperature: f64,
    pub heart_rate: f64,
}

impl Default for ImputationDefaults {
    fn default() -> Self {
        Self {
            duration_days: 3.0,
            temperature: 39.0,
            heart_rate: 80.0,
        }
    }
}

impl ImputationDefaults {
    /// Medians of the successfully parsed values, with fixed defaults when none parsed.
    pub fn from_pending(records: &[PendingRecord]) -> Self {
        let fallback = Self::default();
        let durations: Vec<f64> = records.iter().filter_map(|r| r.duration_days).collect();
        let temperatures: Vec<f64> = records.iter().filter_map(|r| r.temperature).collect();
        let heart_rates: Vec<f64> = records.iter().filter_map(|r| r.heart_rate).collect();
        Self {
            duration_days: median(&durations).unwrap_or(fallback.duration_days),
            temperature: median(&temperatures).unwrap_or(fallback.temperature),
            heart_rate: median(&heart_rates).unwrap_or(fallback.heart_rate),
        }
    }
}

/// Record whose vitals are parsed but not yet imputed.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub species: String,
    pub breed: String,
    pub sex: String,
    pub age: f64,
    pub weight: f64,
    pub symptoms: [String; 4],
    pub duration_days: Option<f64>,
    pub temperature: Option<f64>,
    pub heart_rate: Option<f64>,
    pub flags: SymptomFlags,
}

impl PendingRecord {
    /// Fill missing vitals from the defaults.
    pub fn complete(self, defaults: &ImputationDefaults) -> ClinicalRecord {
        let imputed = ImputedFields {
            duration: self.duration_days.is_none(),
            temperature: self.temperature.is_none(),
            heart_rate: self.heart_rate.is_none(),
        };
        ClinicalRecord {
            species: self.species,
            breed: self.breed,
            sex: self.sex,
            age: self.age,
            weight: self.weight,
            symptoms: self.symptoms,
            duration_days: self.duration_days.unwrap_or(defaults.duration_days),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            heart_rate: self.heart_rate.unwrap_or(defaults.heart_rate),
            flags: self.flags,
            imputed,
        }
    }
}

/// Collect up to four symptom slots, padding with [`MISSING_CATEGORY`].
pub fn symptom_slots<S: AsRef<str>>(symptoms: &[S]) -> [String; 4] {
    let slot = |i: usize| normalize_category(symptoms.get(i).map(|s| s.as_ref()));
    [slot(0), slot(1), slot(2), slot(3)]
}

/// Normalizer for prediction-time observations.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    defaults: ImputationDefaults,
}

impl Normalizer {
    /// Create a normalizer that imputes with the given training medians.
    pub fn new(defaults: ImputationDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &ImputationDefaults {
        &self.defaults
    }

    /// Normalize an observation into a clinical record.
    ///
    /// Unparsable vitals are imputed; non-finite age/weight and a blank
    /// species are rejected.
    pub fn normalize(&self, obs: &Observation) -> NormalizeResult<ClinicalRecord> {
        let species = obs.species.trim();
        if species.is_empty() {
            return Err(NormalizeError::MissingField("species"));
        }
        let age = finite_or_zero("age", obs.age)?;
        let weight = finite_or_zero("weight", obs.weight)?;

        let pending = PendingRecord {
            species: species.to_string(),
            breed: normalize_category(obs.breed.as_deref()),
            sex: normalize_category(obs.sex.as_deref()),
            age,
            weight,
            symptoms: symptom_slots(&obs.symptoms),
            duration_days: obs.duration.as_deref().and_then(parse_duration_days),
            temperature: obs.temperature.as_deref().and_then(parse_temperature),
            heart_rate: obs.heart_rate.as_deref().and_then(parse_heart_rate),
            flags: obs.flags,
        };
        Ok(pending.complete(&self.defaults))
    }
}

fn finite_or_zero(field: &'static str, value: Option<f64>) -> NormalizeResult<f64> {
    match value {
        None => Ok(0.0),
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(NormalizeError::InvalidNumber {
            field,
            value: v.to_string(),
        }),
    }
}
