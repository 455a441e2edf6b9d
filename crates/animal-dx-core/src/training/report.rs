//! Training run report.

use serde::{Deserialize, Serialize};

use super::{ConsolidationSummary, Degradation, Evaluation};
use crate::dataset::RowRejection;
use crate::models::{BundleKind, Syndrome};

/// Outcome of one (species, syndrome) group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    pub syndrome: Syndrome,
    pub samples: usize,
    pub labels: usize,
    pub bundle: BundleKind,
    /// Learners that made it into the ensemble
    pub members: Vec<String>,
    pub evaluation: Option<Evaluation>,
    pub degradations: Vec<Degradation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesReport {
    pub species: String,
    pub consolidation: ConsolidationSummary,
    pub syndrome_evaluation: Option<Evaluation>,
    pub syndrome_degradations: Vec<Degradation>,
    pub groups: Vec<GroupReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSpecies {
    pub species: String,
    pub samples: usize,
    pub reason: Degradation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub run_id: String,
    pub seed: u64,
    pub samples: usize,
    pub species: Vec<SpeciesReport>,
    pub skipped: Vec<SkippedSpecies>,
    pub rejected_rows: Vec<RowRejection>,
}

impl TrainingReport {
    pub fn trained_species(&self) -> Vec<&str> {
        self.species.iter().map(|s| s.species.as_str()).collect()
    }

    /// Every degradation recorded in the run.
    pub fn degradations(&self) -> impl Iterator<Item = &Degradation> {
        self.species.iter().flat_map(|s| {
            s.syndrome_degradations
                .iter()
                .chain(s.groups.iter().flat_map(|g| g.degradations.iter()))
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
