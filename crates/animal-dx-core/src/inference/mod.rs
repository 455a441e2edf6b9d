//! Two-stage inference over loaded artifacts.
//!
//! Pipeline: Observation → Normalizer → syndrome classifier → disease bundle → Prediction

mod cascade;

pub use cascade::*;

use strsim::jaro_winkler;
use thiserror::Error;

use crate::features::NormalizeError;

/// Minimum Jaro-Winkler similarity for a species suggestion.
pub const SUGGESTION_THRESHOLD: f64 = 0.85;

/// Prediction errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("No trained models for species {species:?} (available: {})", .available.join(", "))]
    UnknownSpecies {
        species: String,
        available: Vec<String>,
        suggestion: Option<String>,
    },

    #[error("Invalid observation: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("No disease bundles for species {species:?}")]
    NoDiseaseBundles { species: String },

    #[error("Invalid model for {species}: {reason}")]
    InvalidModel { species: String, reason: String },
}

pub type PredictionResult<T> = Result<T, PredictionError>;

impl PredictionError {
    /// Species with artifacts, when the error is an unknown species.
    pub fn available_species(&self) -> &[String] {
        match self {
            PredictionError::UnknownSpecies { available, .. } => available,
            _ => &[],
        }
    }
}

/// Closest known species name, if any is similar enough.
pub fn suggest_species(query: &str, available: &[String]) -> Option<String> {
    let query = query.trim().to_lowercase();
    available
        .iter()
        .map(|name| (name, jaro_winkler(&query, &name.to_lowercase())))
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name.clone())
}
