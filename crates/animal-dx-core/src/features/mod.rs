//! Feature normalization, derived clinical indicators and encoding.
//!
//! Pipeline: raw fields → Normalizer → ClinicalRecord → ClinicalFeatures → feature vector

mod clinical;
mod encoding;
pub mod normalizer;
mod scaler;

pub use clinical::*;
pub use encoding::*;
pub use normalizer::{
    ImputationDefaults, NormalizeError, NormalizeResult, Normalizer, PendingRecord,
};
pub use scaler::*;
