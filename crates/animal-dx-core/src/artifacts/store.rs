//! JSON artifact store with checksummed, atomically replaced files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{
    ArtifactError, ArtifactResult, DiseaseBundle, DiseaseEnsemble, ModelSet, RunInfo,
    SpeciesArtifacts, SyndromeModel,
};
use crate::features::{
    feature_columns, CategoricalEncoders, ImputationDefaults, LabelEncoder, StandardScaler,
};
use crate::models::{species_key, Syndrome};

pub const SCHEMA_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "animal_artifacts.json";
pub const SYNDROME_FILE: &str = "syndrome_clf.json";
const DISEASE_PREFIX: &str = "disease_models_";

pub fn disease_file_name(syndrome: Syndrome) -> String {
    format!("{}{}.json", DISEASE_PREFIX, syndrome.as_str())
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Reference from the manifest to a group's bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BundleRef {
    Trivial { disease: String, confidence: f64 },
    Fallback { confidence: f64 },
    Ensemble { file: String, checksum: String },
}

/// Contents of `animal_artifacts.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub schema_version: u32,
    pub species: String,
    pub run_id: String,
    pub trained_at: DateTime<Utc>,
    pub feature_columns: Vec<String>,
    pub encoders: CategoricalEncoders,
    pub syndrome_encoder: LabelEncoder,
    pub syndrome_scaler: StandardScaler,
    pub imputation: ImputationDefaults,
    pub top_k: usize,
    pub syndrome_checksum: String,
    /// Syndrome name → bundle
    pub bundles: BTreeMap<String, BundleRef>,
}

#[derive(Deserialize)]
struct ManifestHeader {
    species: String,
}

/// Filesystem store rooted at a models directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// One directory per [`species_key`], whatever spelling was saved.
    pub fn species_dir(&self, species: &str) -> PathBuf {
        self.root.join(species_key(species))
    }

    /// Write one species' artifacts, replacing any previous run.
    ///
    /// Bundle files are written first and the manifest last, so a reader
    /// never sees a manifest pointing at files that are not there yet.
    pub fn save(&self, artifacts: &SpeciesArtifacts) -> ArtifactResult<()> {
        let dir = self.species_dir(&artifacts.species);
        fs::create_dir_all(&dir)?;

        let mut bundles = BTreeMap::new();
        let mut written = Vec::new();
        for (syndrome, bundle) in &artifacts.disease_bundles {
            let reference = match bundle {
                DiseaseBundle::Trivial { disease, confidence } => BundleRef::Trivial {
                    disease: disease.clone(),
                    confidence: *confidence,
                },
                DiseaseBundle::Fallback { confidence } => BundleRef::Fallback {
                    confidence: *confidence,
                },
                DiseaseBundle::Ensemble(ensemble) => {
                    let file = disease_file_name(*syndrome);
                    let checksum = write_json(&dir.join(&file), ensemble)?;
                    written.push(file.clone());
                    BundleRef::Ensemble { file, checksum }
                }
            };
            bundles.insert(syndrome.as_str().to_string(), reference);
        }

        let syndrome_checksum = write_json(&dir.join(SYNDROME_FILE), &artifacts.syndrome_model)?;
        let manifest = ArtifactManifest {
            schema_version: SCHEMA_VERSION,
            species: artifacts.species.clone(),
            run_id: artifacts.run.run_id.clone(),
            trained_at: artifacts.run.trained_at,
            feature_columns: artifacts.feature_columns.clone(),
            encoders: artifacts.encoders.clone(),
            syndrome_encoder: artifacts.syndrome_model.encoder.clone(),
            syndrome_scaler: artifacts.syndrome_model.scaler.clone(),
            imputation: artifacts.imputation,
            top_k: artifacts.top_k,
            syndrome_checksum,
            bundles,
        };
        write_json(&dir.join(MANIFEST_FILE), &manifest)?;
        self.remove_stale(&dir, &written)?;

        info!(
            species = %artifacts.species,
            dir = %dir.display(),
            bundles = artifacts.disease_bundles.len(),
            "Saved artifacts"
        );
        Ok(())
    }

    fn remove_stale(&self, dir: &Path, keep: &[String]) -> ArtifactResult<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(DISEASE_PREFIX) && !keep.contains(&name) {
                debug!(file = %name, "Removing stale disease bundle");
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Species with a manifest under the root, sorted.
    pub fn available_species(&self) -> ArtifactResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut species = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path().join(MANIFEST_FILE);
            if !path.is_file() {
                continue;
            }
            match read_json::<ManifestHeader>(&path) {
                Ok(header) => species.push(header.species),
                Err(e) => warn!(path = %path.display(), error = %e, "Unreadable manifest"),
            }
        }
        species.sort();
        Ok(species)
    }

    /// Load and verify one species.
    pub fn load(&self, species: &str) -> ArtifactResult<SpeciesArtifacts> {
        let dir = self.species_dir(species);
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(ArtifactError::NotFound(species.to_string()));
        }
        let manifest: ArtifactManifest = read_json(&manifest_path)?;
        if manifest.schema_version != SCHEMA_VERSION {
            return Err(ArtifactError::SchemaVersion {
                found: manifest.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        if manifest.feature_columns != feature_columns() {
            return Err(ArtifactError::FeatureColumns {
                species: manifest.species,
            });
        }

        let syndrome_model: SyndromeModel =
            read_verified(&dir.join(SYNDROME_FILE), &manifest.syndrome_checksum)?;
        if syndrome_model.encoder != manifest.syndrome_encoder
            || syndrome_model.scaler != manifest.syndrome_scaler
        {
            return Err(ArtifactError::Invalid(format!(
                "{} disagrees with {}",
                SYNDROME_FILE, MANIFEST_FILE
            )));
        }

        let mut disease_bundles = BTreeMap::new();
        for (name, reference) in &manifest.bundles {
            let syndrome: Syndrome = name.parse()?;
            let bundle = match reference {
                BundleRef::Trivial { disease, confidence } => DiseaseBundle::Trivial {
                    disease: disease.clone(),
                    confidence: *confidence,
                },
                BundleRef::Fallback { confidence } => DiseaseBundle::Fallback {
                    confidence: *confidence,
                },
                BundleRef::Ensemble { file, checksum } => {
                    let ensemble: DiseaseEnsemble = read_verified(&dir.join(file), checksum)?;
                    DiseaseBundle::Ensemble(ensemble)
                }
            };
            disease_bundles.insert(syndrome, bundle);
        }

        debug!(species = %manifest.species, bundles = disease_bundles.len(), "Loaded artifacts");
        Ok(SpeciesArtifacts {
            species: manifest.species,
            syndrome_model,
            disease_bundles,
            encoders: manifest.encoders,
            feature_columns: manifest.feature_columns,
            imputation: manifest.imputation,
            top_k: manifest.top_k,
            run: RunInfo {
                run_id: manifest.run_id,
                trained_at: manifest.trained_at,
            },
        })
    }

    /// Load every species into a fresh [`ModelSet`]. Species that fail to load are skipped.
    pub fn load_all(&self) -> ArtifactResult<ModelSet> {
        let mut loaded = Vec::new();
        for species in self.available_species()? {
            match self.load(&species) {
                Ok(artifacts) => loaded.push(artifacts),
                Err(e) => warn!(species = %species, error = %e, "Skipping species artifacts"),
            }
        }
        info!(species = loaded.len(), root = %self.root.display(), "Loaded model set");
        Ok(ModelSet::new(loaded))
    }
}

/// Serialize to `path` via a temp file and rename. Returns the SHA-256 of the bytes.
fn write_json<T: Serialize>(path: &Path, value: &T) -> ArtifactResult<String> {
    let bytes = serde_json::to_vec(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, path)?;
    Ok(checksum(&bytes))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> ArtifactResult<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn read_verified<T: DeserializeOwned>(path: &Path, expected: &str) -> ArtifactResult<T> {
    let bytes = fs::read(path)?;
    let actual = checksum(&bytes);
    if actual != expected {
        return Err(ArtifactError::ChecksumMismatch {
            file: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(serde_json::from_slice(&bytes)?)
}
