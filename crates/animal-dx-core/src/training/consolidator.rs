//! Per-species rare label consolidation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{species_key, Sample};

/// Catch-all label for consolidated rare diseases.
pub const OTHER_LABEL: &str = "Other";

/// What consolidation did to one species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationSummary {
    pub species: String,
    pub samples: usize,
    /// Labels left as-is
    pub kept: BTreeSet<String>,
    /// Labels rewritten to [`OTHER_LABEL`]
    pub merged: BTreeSet<String>,
    /// Samples whose label was rewritten
    pub relabelled: usize,
}

/// Merges labels seen fewer than `threshold` times into [`OTHER_LABEL`].
#[derive(Debug, Clone, Copy)]
pub struct LabelConsolidator {
    threshold: usize,
}

impl LabelConsolidator {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    /// Relabel one species' samples. Never drops or adds samples.
    pub fn consolidate(
        &self,
        species: &str,
        mut samples: Vec<Sample>,
    ) -> (Vec<Sample>, ConsolidationSummary) {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for s in &samples {
            *counts.entry(s.disease.clone()).or_default() += 1;
        }

        let mut kept = BTreeSet::new();
        let mut merged = BTreeSet::new();
        for (label, count) in counts {
            if count >= self.threshold {
                kept.insert(label);
            } else {
                merged.insert(label);
            }
        }

        let mut relabelled = 0;
        for s in &mut samples {
            if merged.contains(&s.disease) {
                s.disease = OTHER_LABEL.to_string();
                relabelled += 1;
            }
        }
        debug!(
            species,
            kept = kept.len(),
            merged = merged.len(),
            relabelled,
            "Consolidated labels"
        );

        let summary = ConsolidationSummary {
            species: species.to_string(),
            samples: samples.len(),
            kept,
            merged,
            relabelled,
        };
        (samples, summary)
    }
}

impl Default for LabelConsolidator {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Group samples by [`species_key`], in key order.
///
/// Each group is named by the first spelling seen for its key, and every
/// sample in it is relabelled to that spelling.
pub fn group_by_species(samples: Vec<Sample>) -> BTreeMap<String, Vec<Sample>> {
    let mut by_key: BTreeMap<String, (String, Vec<Sample>)> = BTreeMap::new();
    for mut s in samples {
        let (name, group) = by_key
            .entry(species_key(s.species()))
            .or_insert_with(|| (s.species().trim().to_string(), Vec::new()));
        if s.record.species != *name {
            s.record.species = name.clone();
        }
        group.push(s);
    }

    let mut groups = BTreeMap::new();
    for (key, (name, group)) in by_key {
        debug!(species = %name, key = %key, samples = group.len(), "Grouped species");
        groups.insert(name, group);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::normalizer::symptom_slots;
    use crate::models::{ClinicalRecord, ImputedFields, SymptomFlags};
    use proptest::prelude::*;

    fn sample(species: &str, disease: &str) -> Sample {
        Sample {
            record: ClinicalRecord {
                species: species.into(),
                breed: "NA".into(),
                sex: "NA".into(),
                age: 1.0,
                weight: 10.0,
                symptoms: symptom_slots::<&str>(&[]),
                duration_days: 1.0,
                temperature: 38.5,
                heart_rate: 90.0,
                flags: SymptomFlags::default(),
                imputed: ImputedFields::default(),
            },
            disease: disease.into(),
        }
    }

    #[test]
    fn test_rare_labels_become_other() {
        let samples = vec![
            sample("Dog", "Parvovirus"),
            sample("Dog", "Parvovirus"),
            sample("Dog", "Parvovirus"),
            sample("Dog", "Rabies"),
            sample("Dog", "Distemper"),
        ];
        let (out, summary) = LabelConsolidator::new(3).consolidate("Dog", samples);
        let labels: Vec<&str> = out.iter().map(|s| s.disease.as_str()).collect();
        assert_eq!(labels, vec!["Parvovirus", "Parvovirus", "Parvovirus", "Other", "Other"]);
        assert_eq!(summary.kept.len(), 1);
        assert_eq!(summary.merged.len(), 2);
        assert_eq!(summary.relabelled, 2);
    }

    #[test]
    fn test_species_are_independent_label_spaces() {
        let mut samples = vec![sample("Cow", "Anthrax"); 3];
        samples.push(sample("Dog", "Anthrax"));
        let groups = group_by_species(samples);
        let consolidator = LabelConsolidator::new(3);

        let (cows, _) = consolidator.consolidate("Cow", groups["Cow"].clone());
        let (dogs, _) = consolidator.consolidate("Dog", groups["Dog"].clone());
        assert!(cows.iter().all(|s| s.disease == "Anthrax"));
        assert_eq!(dogs[0].disease, OTHER_LABEL);
    }

    #[test]
    fn test_species_spellings_group_together() {
        let samples = vec![
            sample("Dog", "Parvovirus"),
            sample("dog", "Parvovirus"),
            sample(" DOG ", "Kennel Cough"),
            sample("Guinea Pig", "Scurvy"),
            sample("guinea_pig", "Scurvy"),
        ];
        let groups = group_by_species(samples);

        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["Dog", "Guinea Pig"]);
        assert_eq!(groups["Dog"].len(), 3);
        assert!(groups["Dog"].iter().all(|s| s.species() == "Dog"));
        assert_eq!(groups["Guinea Pig"].len(), 2);
    }

    proptest! {
        #[test]
        fn prop_row_count_preserved(
            labels in proptest::collection::vec(0u8..6, 0..60),
            threshold in 1usize..6,
        ) {
            let samples: Vec<Sample> = labels
                .iter()
                .map(|l| sample("Goat", &format!("D{}", l)))
                .collect();
            let n = samples.len();
            let (out, summary) = LabelConsolidator::new(threshold).consolidate("Goat", samples);
            prop_assert_eq!(out.len(), n);
            prop_assert_eq!(summary.samples, n);
            for s in &out {
                prop_assert!(s.disease == OTHER_LABEL || summary.kept.contains(&s.disease));
            }
        }
    }
}
