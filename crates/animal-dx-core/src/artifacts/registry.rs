//! In-process registry of loaded species artifacts.
//!
//! A `ModelSet` is immutable once built. The registry only ever swaps the
//! whole set, so a reader holding a snapshot sees one consistent run.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use super::{ArtifactResult, ArtifactStore, DiseaseBundle, SpeciesArtifacts};
use crate::models::{species_key, GroupKey};

/// Loaded artifacts keyed by [`species_key`].
#[derive(Debug, Default)]
pub struct ModelSet {
    species: BTreeMap<String, Arc<SpeciesArtifacts>>,
}

impl ModelSet {
    /// Build a set. When two artifacts share a key the most recently
    /// trained one is kept and the other is reported.
    pub fn new(artifacts: Vec<SpeciesArtifacts>) -> Self {
        let mut species: BTreeMap<String, Arc<SpeciesArtifacts>> = BTreeMap::new();
        for a in artifacts {
            match species.entry(species_key(&a.species)) {
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(a));
                }
                Entry::Occupied(mut slot) => {
                    let (kept, dropped) = if a.run.trained_at > slot.get().run.trained_at {
                        let dropped = slot.insert(Arc::new(a));
                        (slot.get().species.clone(), dropped.species.clone())
                    } else {
                        (slot.get().species.clone(), a.species)
                    };
                    warn!(
                        key = %slot.key(),
                        kept = %kept,
                        dropped = %dropped,
                        "Duplicate species artifacts"
                    );
                }
            }
        }
        Self { species }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Case-insensitive species lookup.
    pub fn get(&self, species: &str) -> Option<&Arc<SpeciesArtifacts>> {
        self.species.get(&species_key(species))
    }

    /// Species names as trained, sorted.
    pub fn species_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.species.values().map(|a| a.species.clone()).collect();
        names.sort();
        names
    }

    /// Exact bundle for a group, without the Multi/any fallback.
    pub fn bundle(&self, key: &GroupKey) -> Option<&DiseaseBundle> {
        self.get(&key.species)?.disease_bundles.get(&key.syndrome)
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }
}

/// Shared handle to the current `ModelSet`.
#[derive(Debug)]
pub struct ModelRegistry {
    current: RwLock<Arc<ModelSet>>,
}

impl ModelRegistry {
    pub fn new(models: ModelSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(models)),
        }
    }

    /// The set in effect right now. Later publishes do not affect it.
    pub fn snapshot(&self) -> Arc<ModelSet> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the whole set in one step.
    pub fn publish(&self, models: ModelSet) {
        let next = Arc::new(models);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Load every species from `store` and publish it. On error the
    /// current set stays in place.
    pub fn reload(&self, store: &ArtifactStore) -> ArtifactResult<usize> {
        let models = store.load_all()?;
        let count = models.len();
        self.publish(models);
        info!(species = count, root = %store.root().display(), "Published model set");
        Ok(count)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(ModelSet::empty())
    }
}
