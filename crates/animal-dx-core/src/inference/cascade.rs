//! Inference cascade.
//!
//! States run strictly in order:
//!
//! ```text
//! Start → SyndromePredicted → DiseaseResolved → Result
//! ```
//!
//! - Start: species lookup, normalization, feature encoding
//! - SyndromePredicted: stage-1 argmax and its calibrated probability
//! - DiseaseResolved: bundle for the syndrome, else Multi, else any
//! - Result: compound confidence and the ranked list

use std::sync::Arc;

use tracing::{debug, warn};

use super::{suggest_species, PredictionError, PredictionResult};
use crate::artifacts::{DiseaseBundle, ModelSet, SpeciesArtifacts};
use crate::features::{feature_vector, ClinicalFeatures, Normalizer};
use crate::learners::argmax;
use crate::models::{
    BundleKind, ClinicalRecord, Observation, Prediction, RankedDisease, Syndrome, UnknownSyndrome,
};
use crate::training::{top_k, OTHER_LABEL};

/// Observation encoded against one species' artifacts.
#[derive(Debug, Clone)]
pub struct EncodedObservation {
    pub artifacts: Arc<SpeciesArtifacts>,
    pub record: ClinicalRecord,
    pub features: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyndromeStage {
    pub syndrome: Syndrome,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiseaseStage {
    pub resolved_syndrome: Syndrome,
    pub bundle_kind: BundleKind,
    pub disease: String,
    /// Stage-2 probability of `disease`
    pub confidence: f64,
    /// Unscaled ranked list
    pub ranked: Vec<RankedDisease>,
}

/// One state of the cascade.
#[derive(Debug, Clone)]
pub enum CascadeState<'a> {
    Start(&'a Observation),
    SyndromePredicted {
        input: EncodedObservation,
        syndrome: SyndromeStage,
    },
    DiseaseResolved {
        input: EncodedObservation,
        syndrome: SyndromeStage,
        disease: DiseaseStage,
    },
    Result(Prediction),
}

/// Read-only predictor over one model-set snapshot.
#[derive(Debug, Clone)]
pub struct InferenceCascade {
    models: Arc<ModelSet>,
}

impl InferenceCascade {
    pub fn new(models: Arc<ModelSet>) -> Self {
        Self { models }
    }

    pub fn available_species(&self) -> Vec<String> {
        self.models.species_names()
    }

    /// Run an observation through both stages.
    pub fn predict(&self, observation: &Observation) -> PredictionResult<Prediction> {
        let mut state = CascadeState::Start(observation);
        loop {
            state = match self.step(state)? {
                CascadeState::Result(prediction) => return Ok(prediction),
                next => next,
            };
        }
    }

    /// Advance one state.
    pub fn step<'a>(&self, state: CascadeState<'a>) -> PredictionResult<CascadeState<'a>> {
        Ok(match state {
            CascadeState::Start(observation) => {
                let input = self.encode(observation)?;
                let syndrome = predict_syndrome(&input)?;
                CascadeState::SyndromePredicted { input, syndrome }
            }
            CascadeState::SyndromePredicted { input, syndrome } => {
                let disease = resolve_disease(&input, syndrome.syndrome)?;
                CascadeState::DiseaseResolved {
                    input,
                    syndrome,
                    disease,
                }
            }
            CascadeState::DiseaseResolved {
                input,
                syndrome,
                disease,
            } => CascadeState::Result(assemble(input, syndrome, disease)),
            done @ CascadeState::Result(_) => done,
        })
    }

    fn encode(&self, observation: &Observation) -> PredictionResult<EncodedObservation> {
        let Some(artifacts) = self.models.get(&observation.species) else {
            let available = self.models.species_names();
            let suggestion = suggest_species(&observation.species, &available);
            warn!(
                species = %observation.species,
                suggestion = suggestion.as_deref().unwrap_or(""),
                "Prediction for unknown species"
            );
            return Err(PredictionError::UnknownSpecies {
                species: observation.species.clone(),
                available,
                suggestion,
            });
        };
        let record = Normalizer::new(artifacts.imputation).normalize(observation)?;
        let features = feature_vector(&record, &artifacts.encoders);
        Ok(EncodedObservation {
            artifacts: Arc::clone(artifacts),
            record,
            features,
        })
    }
}

fn invalid(input: &EncodedObservation, reason: impl Into<String>) -> PredictionError {
    PredictionError::InvalidModel {
        species: input.artifacts.species.clone(),
        reason: reason.into(),
    }
}

fn predict_syndrome(input: &EncodedObservation) -> PredictionResult<SyndromeStage> {
    let model = &input.artifacts.syndrome_model;
    let proba = model.predict_proba(&input.features);
    if proba.is_empty() {
        return Err(invalid(input, "syndrome classifier has no classes"));
    }
    let best = argmax(&proba);
    let label = model
        .encoder
        .decode(best)
        .ok_or_else(|| invalid(input, format!("syndrome class {} has no label", best)))?;
    let syndrome: Syndrome = label
        .parse()
        .map_err(|e: UnknownSyndrome| invalid(input, e.to_string()))?;

    debug!(
        species = %input.artifacts.species,
        syndrome = %syndrome,
        confidence = proba[best],
        "Syndrome predicted"
    );
    Ok(SyndromeStage {
        syndrome,
        confidence: proba[best],
    })
}

fn resolve_disease(
    input: &EncodedObservation,
    syndrome: Syndrome,
) -> PredictionResult<DiseaseStage> {
    let artifacts = &input.artifacts;
    let (resolved, bundle) = artifacts
        .resolve_bundle(syndrome)
        .ok_or_else(|| PredictionError::NoDiseaseBundles {
            species: artifacts.species.clone(),
        })?;
    if resolved != syndrome {
        debug!(
            species = %artifacts.species,
            syndrome = %syndrome,
            resolved = %resolved,
            "Using substitute bundle"
        );
    }

    let single = |disease: &str, confidence: f64| DiseaseStage {
        resolved_syndrome: resolved,
        bundle_kind: bundle.kind(),
        disease: disease.to_string(),
        confidence,
        ranked: vec![RankedDisease {
            disease: disease.to_string(),
            probability: confidence,
        }],
    };

    match bundle {
        DiseaseBundle::Trivial { disease, confidence } => Ok(single(disease, *confidence)),
        DiseaseBundle::Fallback { confidence } => Ok(single(OTHER_LABEL, *confidence)),
        DiseaseBundle::Ensemble(ensemble) => {
            let proba = ensemble.predict_proba(&input.features);
            let order = top_k(&proba, artifacts.top_k.max(1));
            let mut ranked = Vec::with_capacity(order.len());
            for index in order {
                let disease = ensemble.encoder.decode(index).ok_or_else(|| {
                    invalid(input, format!("disease class {} has no label", index))
                })?;
                ranked.push(RankedDisease {
                    disease: disease.to_string(),
                    probability: proba[index],
                });
            }
            let top = ranked
                .first()
                .cloned()
                .ok_or_else(|| invalid(input, format!("{} ensemble has no classes", resolved)))?;
            Ok(DiseaseStage {
                resolved_syndrome: resolved,
                bundle_kind: BundleKind::Ensemble,
                disease: top.disease,
                confidence: top.probability,
                ranked,
            })
        }
    }
}

fn assemble(
    input: EncodedObservation,
    syndrome: SyndromeStage,
    disease: DiseaseStage,
) -> Prediction {
    let (confidence, top_predictions) = match disease.bundle_kind {
        BundleKind::Ensemble => {
            let ranked = disease
                .ranked
                .into_iter()
                .map(|r| RankedDisease {
                    probability: r.probability * syndrome.confidence,
                    ..r
                })
                .collect();
            (disease.confidence * syndrome.confidence, ranked)
        }
        BundleKind::Trivial | BundleKind::Fallback => (disease.confidence, disease.ranked),
    };

    let clinical = ClinicalFeatures::derive(&input.record);
    Prediction {
        species: input.artifacts.species.clone(),
        predicted_disease: disease.disease,
        confidence: confidence.clamp(0.0, 1.0),
        top_predictions,
        syndrome: syndrome.syndrome,
        syndrome_confidence: syndrome.confidence,
        resolved_syndrome: disease.resolved_syndrome,
        bundle_kind: disease.bundle_kind,
        disease_confidence: disease.confidence,
        syndrome_analysis: clinical.syndrome_analysis(),
        vital_signs: clinical.vitals,
        condition_severity: clinical.severity,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::artifacts::{DiseaseEnsemble, EnsembleMember, RunInfo, SyndromeModel};
    use crate::config::ForestConfig;
    use crate::features::{
        feature_columns, normalizer::symptom_slots, CategoricalEncoders, ImputationDefaults,
        LabelEncoder, StandardScaler,
    };
    use crate::learners::{BaseLearner, LearnerKind, RandomForest};
    use crate::models::{ConditionSeverity, ImputedFields, SymptomFlags, VitalStatus};
    use crate::training::CalibratedModel;

    fn record(flags: SymptomFlags, temperature: f64) -> ClinicalRecord {
        ClinicalRecord {
            species: "Dog".into(),
            breed: "Beagle".into(),
            sex: "Male".into(),
            age: 4.0,
            weight: 12.0,
            symptoms: symptom_slots(&["NA"]),
            duration_days: 2.0,
            temperature,
            heart_rate: 100.0,
            flags,
            imputed: ImputedFields::default(),
        }
    }

    fn cough() -> SymptomFlags {
        SymptomFlags {
            coughing: true,
            ..Default::default()
        }
    }

    fn forest(x: &[Vec<f64>], y: &[usize], n_classes: usize) -> CalibratedModel {
        let config = ForestConfig {
            n_estimators: 25,
            ..Default::default()
        };
        let forest = RandomForest::fit(x, y, n_classes, &config, 7).unwrap();
        CalibratedModel::uncalibrated(BaseLearner::RandomForest(forest))
    }

    /// Dog artifacts: syndrome model separating Respiratory (cough) from
    /// Multi (no findings), with `respiratory` as the Respiratory bundle.
    fn dog(respiratory: Option<DiseaseBundle>, multi: Option<DiseaseBundle>) -> SpeciesArtifacts {
        let records: Vec<ClinicalRecord> = (0..20)
            .map(|i| {
                let flags = if i % 2 == 0 { cough() } else { SymptomFlags::default() };
                record(flags, 38.5 + (i % 5) as f64 * 0.1)
            })
            .collect();
        let encoders = CategoricalEncoders::fit(records.iter());
        let x: Vec<Vec<f64>> = records.iter().map(|r| feature_vector(r, &encoders)).collect();
        let encoder = LabelEncoder::fit(["Multi", "Respiratory"]);
        let y: Vec<usize> = (0..20).map(|i| if i % 2 == 0 { 1 } else { 0 }).collect();
        let scaler = StandardScaler::fit(&x);
        let classifier = forest(&scaler.transform_all(&x), &y, 2);

        let mut disease_bundles = BTreeMap::new();
        if let Some(b) = respiratory {
            disease_bundles.insert(Syndrome::Respiratory, b);
        }
        if let Some(b) = multi {
            disease_bundles.insert(Syndrome::Multi, b);
        }
        SpeciesArtifacts {
            species: "Dog".into(),
            syndrome_model: SyndromeModel {
                classifier,
                encoder,
                scaler,
            },
            disease_bundles,
            encoders,
            feature_columns: feature_columns(),
            imputation: ImputationDefaults::default(),
            top_k: 3,
            run: RunInfo::new(),
        }
    }

    /// Ensemble over three labels where high temperature means "Pneumonia".
    fn respiratory_ensemble(artifacts: &SpeciesArtifacts) -> DiseaseBundle {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..30 {
            let (temperature, label) = match i % 3 {
                0 => (40.5, 2),
                1 => (38.6, 0),
                _ => (38.0, 1),
            };
            x.push(feature_vector(&record(cough(), temperature), &artifacts.encoders));
            y.push(label);
        }
        let scaler = StandardScaler::fit(&x);
        let model = forest(&scaler.transform_all(&x), &y, 3);
        DiseaseBundle::Ensemble(DiseaseEnsemble {
            members: vec![EnsembleMember {
                learner: LearnerKind::RandomForest,
                model,
            }],
            encoder: LabelEncoder::fit(["Bronchitis", "Kennel Cough", "Pneumonia"]),
            scaler,
        })
    }

    fn cascade(artifacts: SpeciesArtifacts) -> InferenceCascade {
        InferenceCascade::new(Arc::new(ModelSet::new(vec![artifacts])))
    }

    fn observation(flags: SymptomFlags, temperature: &str) -> Observation {
        Observation {
            breed: Some("Beagle".into()),
            sex: Some("Male".into()),
            age: Some(4.0),
            weight: Some(12.0),
            duration: Some("1".into()),
            temperature: Some(temperature.into()),
            heart_rate: Some("100".into()),
            flags,
            ..Observation::new("Dog")
        }
    }

    #[test]
    fn test_unknown_species_lists_available() {
        let cascade = cascade(dog(None, Some(DiseaseBundle::Fallback { confidence: 0.2 })));
        let err = cascade.predict(&Observation::new("Dogg")).unwrap_err();
        match err {
            PredictionError::UnknownSpecies {
                species,
                available,
                suggestion,
            } => {
                assert_eq!(species, "Dogg");
                assert_eq!(available, vec!["Dog"]);
                assert_eq!(suggestion.as_deref(), Some("Dog"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_asymptomatic_dog_is_multi_and_acute() {
        let trivial = DiseaseBundle::Trivial {
            disease: "Healthy".into(),
            confidence: 0.95,
        };
        let cascade = cascade(dog(None, Some(trivial)));
        let prediction = cascade.predict(&observation(SymptomFlags::default(), "38.5°C")).unwrap();

        assert_eq!(prediction.syndrome, Syndrome::Multi);
        assert_eq!(prediction.syndrome_analysis.rule_label, Syndrome::Multi);
        assert_eq!(prediction.condition_severity, ConditionSeverity::Acute);
        assert_eq!(prediction.vital_signs.temperature_status, VitalStatus::Normal);
        assert_eq!(prediction.vital_signs.heart_rate_status, VitalStatus::Normal);
    }

    #[test]
    fn test_trivial_bundle_is_not_compounded() {
        let trivial = DiseaseBundle::Trivial {
            disease: "Kennel Cough".into(),
            confidence: 0.95,
        };
        let cascade = cascade(dog(Some(trivial), None));
        let prediction = cascade.predict(&observation(cough(), "38.6")).unwrap();

        assert_eq!(prediction.resolved_syndrome, Syndrome::Respiratory);
        assert_eq!(prediction.predicted_disease, "Kennel Cough");
        assert_eq!(prediction.confidence, 0.95);
        assert_eq!(prediction.bundle_kind, BundleKind::Trivial);
        assert_eq!(prediction.top_predictions.len(), 1);
    }

    #[test]
    fn test_missing_bundle_falls_back_to_multi() {
        let cascade = cascade(dog(None, Some(DiseaseBundle::Fallback { confidence: 0.2 })));
        let prediction = cascade.predict(&observation(cough(), "38.6")).unwrap();

        assert_eq!(prediction.syndrome, Syndrome::Respiratory);
        assert_eq!(prediction.resolved_syndrome, Syndrome::Multi);
        assert_eq!(prediction.predicted_disease, OTHER_LABEL);
        assert_eq!(prediction.confidence, 0.2);
        assert_eq!(prediction.bundle_kind, BundleKind::Fallback);
    }

    #[test]
    fn test_ensemble_confidence_is_compounded() {
        let mut artifacts = dog(None, None);
        let bundle = respiratory_ensemble(&artifacts);
        artifacts.disease_bundles.insert(Syndrome::Respiratory, bundle);
        let cascade = cascade(artifacts);

        let prediction = cascade.predict(&observation(cough(), "40.5°C")).unwrap();
        assert_eq!(prediction.bundle_kind, BundleKind::Ensemble);
        assert_eq!(prediction.predicted_disease, "Pneumonia");
        assert!(prediction.top_predictions.len() <= 3);
        let compounded = prediction.disease_confidence * prediction.syndrome_confidence;
        assert!((prediction.confidence - compounded).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&prediction.confidence));

        let top = &prediction.top_predictions[0];
        assert_eq!(top.disease, "Pneumonia");
        assert!((top.probability - prediction.confidence).abs() < 1e-12);
        for pair in prediction.top_predictions.windows(2) {
            assert!(pair[0].probability >= pair[1].probability);
        }
    }

    #[test]
    fn test_states_advance_in_order() {
        let cascade = cascade(dog(None, Some(DiseaseBundle::Fallback { confidence: 0.2 })));
        let obs = observation(cough(), "38.6");

        let state = cascade.step(CascadeState::Start(&obs)).unwrap();
        assert!(matches!(state, CascadeState::SyndromePredicted { .. }));
        let state = cascade.step(state).unwrap();
        assert!(matches!(state, CascadeState::DiseaseResolved { .. }));
        let state = cascade.step(state).unwrap();
        assert!(matches!(state, CascadeState::Result(_)));
    }

    #[test]
    fn test_species_without_bundles_is_an_error() {
        let cascade = cascade(dog(None, None));
        let err = cascade.predict(&observation(cough(), "38.6")).unwrap_err();
        assert_eq!(err, PredictionError::NoDiseaseBundles { species: "Dog".into() });
    }

    #[test]
    fn test_missing_vitals_use_training_medians() {
        let cascade = cascade(dog(None, Some(DiseaseBundle::Fallback { confidence: 0.2 })));
        let obs = Observation {
            flags: cough(),
            ..Observation::new("dog")
        };
        let prediction = cascade.predict(&obs).unwrap();
        assert_eq!(prediction.species, "Dog");
        assert_eq!(prediction.condition_severity, ConditionSeverity::Acute);
    }
}
