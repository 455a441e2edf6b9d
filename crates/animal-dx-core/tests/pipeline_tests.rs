//! End-to-end training and inference tests.
//!
//! Dataset layout (Dog):
//! - Respiratory (coughing): "Kennel Cough" at 90 bpm, "Pneumonia" at 150 bpm
//! - GI (vomiting): "Parvovirus" only
//! - Dermatological (skin lesions): "Mange" plus one rare "Ringworm"
//! - Multi (no findings): "Healthy" only
//!
//! Cat has too few rows to train; one Dog row has an invalid age.

use std::sync::Arc;

use animal_dx_core::artifacts::ArtifactStore;
use animal_dx_core::config::PipelineConfig;
use animal_dx_core::inference::{InferenceCascade, PredictionError};
use animal_dx_core::training::{Degradation, Trainer, OTHER_LABEL};
use animal_dx_core::{BundleKind, ConditionSeverity, Dataset, Observation, Syndrome, SymptomFlags};

const HEADER: &str = "Animal_Type,Breed,Age,Gender,Weight,Symptom_1,Symptom_2,Symptom_3,Symptom_4,\
Duration,Body_Temperature,Heart_Rate,Appetite_Loss,Vomiting,Diarrhea,Coughing,Labored_Breathing,\
Lameness,Skin_Lesions,Nasal_Discharge,Eye_Discharge,Disease_Prediction";

#[derive(Clone, Copy, Default)]
struct Findings {
    vomiting: bool,
    coughing: bool,
    skin_lesions: bool,
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "Yes"
    } else {
        "No"
    }
}

fn row(species: &str, age: &str, findings: Findings, heart_rate: u32, disease: &str) -> String {
    let symptom = if findings.coughing {
        "Cough"
    } else if findings.vomiting {
        "Vomiting"
    } else if findings.skin_lesions {
        "Itching"
    } else {
        ""
    };
    format!(
        "{},Beagle,{},Male,12,{},,,,2 days,38.6°C,{},No,{},No,{},No,No,{},No,No,{}",
        species,
        age,
        symptom,
        heart_rate,
        yes_no(findings.vomiting),
        yes_no(findings.coughing),
        yes_no(findings.skin_lesions),
        disease
    )
}

fn dataset_csv() -> String {
    let cough = Findings {
        coughing: true,
        ..Default::default()
    };
    let vomit = Findings {
        vomiting: true,
        ..Default::default()
    };
    let skin = Findings {
        skin_lesions: true,
        ..Default::default()
    };

    let mut rows = vec![HEADER.to_string()];
    for _ in 0..12 {
        rows.push(row("Dog", "4", cough, 90, "Kennel Cough"));
        rows.push(row("Dog", "4", cough, 150, "Pneumonia"));
    }
    for _ in 0..10 {
        rows.push(row("Dog", "4", vomit, 100, "Parvovirus"));
        rows.push(row("Dog", "4", Findings::default(), 100, "Healthy"));
    }
    for _ in 0..8 {
        rows.push(row("Dog", "4", skin, 100, "Mange"));
    }
    rows.push(row("Dog", "4", skin, 100, "Ringworm"));
    rows.push(row("Dog", "old", cough, 90, "Kennel Cough"));
    for _ in 0..5 {
        rows.push(row("Cat", "3", vomit, 180, "Hairball"));
    }
    rows.join("\n")
}

fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.forest.n_estimators = 20;
    config.boosting.n_estimators = 15;
    config
}

fn dataset() -> Dataset {
    Dataset::from_reader(dataset_csv().as_bytes()).unwrap()
}

fn observation(symptom: Option<&str>, flags: SymptomFlags, heart_rate: &str) -> Observation {
    Observation {
        symptoms: symptom.map(|s| vec![s.to_string()]).unwrap_or_default(),
        breed: Some("Beagle".into()),
        sex: Some("Male".into()),
        age: Some(4.0),
        weight: Some(12.0),
        duration: Some("1".into()),
        temperature: Some("38.6".into()),
        heart_rate: Some(heart_rate.into()),
        flags,
        ..Observation::new("Dog")
    }
}

fn trained_cascade(dir: &std::path::Path) -> InferenceCascade {
    let output = Trainer::new(small_config()).unwrap().train(&dataset()).unwrap();
    let store = ArtifactStore::new(dir);
    for artifacts in output.artifacts.values() {
        store.save(artifacts).unwrap();
    }
    InferenceCascade::new(Arc::new(store.load_all().unwrap()))
}

#[test]
fn test_dataset_rejects_invalid_rows() {
    let dataset = dataset();
    assert_eq!(dataset.rejected.len(), 1);
    assert_eq!(dataset.rejected[0].field, "Age");
    assert_eq!(dataset.len(), 24 + 20 + 9 + 5);
}

#[test]
fn test_training_report() {
    let output = Trainer::new(small_config()).unwrap().train(&dataset()).unwrap();
    let report = &output.report;

    assert_eq!(report.trained_species(), vec!["Dog"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].species, "Cat");
    assert_eq!(
        report.skipped[0].reason,
        Degradation::TooFewSamples { samples: 5, required: 8 }
    );
    assert_eq!(report.rejected_rows.len(), 1);

    let dog = &report.species[0];
    assert_eq!(dog.consolidation.samples, 53);
    assert_eq!(dog.consolidation.relabelled, 1);
    assert!(dog.consolidation.merged.contains("Ringworm"));

    let bundle = |s: Syndrome| dog.groups.iter().find(|g| g.syndrome == s).map(|g| g.bundle);
    assert_eq!(bundle(Syndrome::Gi), Some(BundleKind::Trivial));
    assert_eq!(bundle(Syndrome::Multi), Some(BundleKind::Trivial));
    assert_eq!(bundle(Syndrome::Respiratory), Some(BundleKind::Ensemble));

    let respiratory = dog.groups.iter().find(|g| g.syndrome == Syndrome::Respiratory).unwrap();
    assert_eq!(respiratory.members.len(), 3);
    let eval = respiratory.evaluation.as_ref().unwrap();
    assert!(eval.topk_accuracy >= eval.top1_accuracy);

    let json = report.to_json().unwrap();
    assert!(json.contains("\"skipped\""));
}

#[test]
fn test_retraining_is_reproducible() {
    let dataset = dataset();
    let first = Trainer::new(small_config()).unwrap().train(&dataset).unwrap().report;
    let second = Trainer::new(small_config()).unwrap().train(&dataset).unwrap().report;

    assert_ne!(first.run_id, second.run_id);
    for (a, b) in first.species.iter().zip(&second.species) {
        assert_eq!(a.consolidation, b.consolidation);
        assert_eq!(a.syndrome_evaluation, b.syndrome_evaluation);
        assert_eq!(a.groups, b.groups);
    }
}

#[test]
fn test_single_label_group_predicts_trivially() {
    let dir = tempfile::tempdir().unwrap();
    let cascade = trained_cascade(dir.path());

    let flags = SymptomFlags {
        vomiting: true,
        ..Default::default()
    };
    let prediction = cascade.predict(&observation(Some("Vomiting"), flags, "100")).unwrap();

    assert_eq!(prediction.syndrome, Syndrome::Gi);
    assert_eq!(prediction.predicted_disease, "Parvovirus");
    assert_eq!(prediction.bundle_kind, BundleKind::Trivial);
    assert_eq!(prediction.confidence, 0.95);
    assert_eq!(prediction.top_predictions.len(), 1);
}

#[test]
fn test_asymptomatic_dog() {
    let dir = tempfile::tempdir().unwrap();
    let cascade = trained_cascade(dir.path());

    let prediction = cascade.predict(&observation(None, SymptomFlags::default(), "100")).unwrap();
    assert_eq!(prediction.syndrome, Syndrome::Multi);
    assert_eq!(prediction.syndrome_analysis.rule_label, Syndrome::Multi);
    assert_eq!(prediction.condition_severity, ConditionSeverity::Acute);
    assert_eq!(prediction.predicted_disease, "Healthy");
}

#[test]
fn test_ensemble_prediction_is_compounded() {
    let dir = tempfile::tempdir().unwrap();
    let cascade = trained_cascade(dir.path());

    let flags = SymptomFlags {
        coughing: true,
        ..Default::default()
    };
    let prediction = cascade.predict(&observation(Some("Cough"), flags, "150")).unwrap();

    assert_eq!(prediction.resolved_syndrome, Syndrome::Respiratory);
    assert_eq!(prediction.bundle_kind, BundleKind::Ensemble);
    assert!((0.0..=1.0).contains(&prediction.confidence));
    assert!(!prediction.top_predictions.is_empty() && prediction.top_predictions.len() <= 3);
    let compounded = prediction.disease_confidence * prediction.syndrome_confidence;
    assert!((prediction.confidence - compounded).abs() < 1e-9);
    let listed: f64 = prediction.top_predictions.iter().map(|r| r.probability).sum();
    assert!(listed <= prediction.syndrome_confidence + 1e-9);
    assert_ne!(prediction.predicted_disease, OTHER_LABEL);
}

#[test]
fn test_unknown_species_lists_trained_species() {
    let dir = tempfile::tempdir().unwrap();
    let cascade = trained_cascade(dir.path());

    let err = cascade.predict(&Observation::new("Cat")).unwrap_err();
    assert_eq!(err.available_species(), &["Dog"]);
    assert!(matches!(err, PredictionError::UnknownSpecies { .. }));
}

#[test]
fn test_species_spellings_train_as_one_species() {
    let cough = Findings {
        coughing: true,
        ..Default::default()
    };
    let vomit = Findings {
        vomiting: true,
        ..Default::default()
    };
    let mut rows = vec![HEADER.to_string()];
    for _ in 0..10 {
        rows.push(row("Dog", "4", cough, 90, "Kennel Cough"));
        rows.push(row("dog", "4", vomit, 100, "Parvovirus"));
    }
    let dataset = Dataset::from_reader(rows.join("\n").as_bytes()).unwrap();

    let output = Trainer::new(small_config()).unwrap().train(&dataset).unwrap();
    assert_eq!(output.report.trained_species(), vec!["Dog"]);
    assert_eq!(output.report.species[0].consolidation.samples, 20);

    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    for artifacts in output.artifacts.values() {
        store.save(artifacts).unwrap();
    }
    let models = store.load_all().unwrap();
    assert_eq!(models.len(), 1);
    let dog = models.get("dog").unwrap();
    assert!(dog.disease_bundles.contains_key(&Syndrome::Gi));
    assert!(dog.disease_bundles.contains_key(&Syndrome::Respiratory));
}

#[test]
fn test_retraining_overwrites_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let trainer = Trainer::new(small_config()).unwrap();

    let first = trainer.train(&dataset()).unwrap();
    store.save(&first.artifacts["Dog"]).unwrap();
    let second = trainer.train(&dataset()).unwrap();
    store.save(&second.artifacts["Dog"]).unwrap();

    let loaded = store.load("Dog").unwrap();
    assert_eq!(loaded.run.run_id, second.report.run_id);
    assert_eq!(store.available_species().unwrap(), vec!["Dog"]);
}
