//! Persisted model artifacts and the in-process registry.
//!
//! Layout under the models root, one directory per species:
//!
//! ```text
//! <root>/<Species>/
//!     animal_artifacts.json          manifest: bundle refs, encoders, checksums
//!     syndrome_clf.json              stage-1 classifier + scaler + encoder
//!     disease_models_<Syndrome>.json one per ensemble bundle
//! ```

mod bundle;
mod registry;
mod store;

pub use bundle::*;
pub use registry::*;
pub use store::*;

use thiserror::Error;

use crate::models::UnknownSyndrome;

/// Artifact IO errors.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No artifacts for species: {0}")]
    NotFound(String),

    #[error("Checksum mismatch for {file}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported schema version {found} (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },

    #[error("Feature columns of {species} do not match this build")]
    FeatureColumns { species: String },

    #[error("Invalid artifact: {0}")]
    Invalid(String),

    #[error(transparent)]
    Syndrome(#[from] UnknownSyndrome),
}

pub type ArtifactResult<T> = Result<T, ArtifactError>;
