//! Stage-2 trainer: one calibrated ensemble per (species, syndrome) group.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::{
    group_seed, Calibrator, ClassBalancer, Degradation, Evaluator, GroupReport, LabeledRows,
    Partitioner, StageOutcome,
};
use crate::artifacts::{DiseaseBundle, DiseaseEnsemble, EnsembleMember};
use crate::config::PipelineConfig;
use crate::features::{feature_vector, CategoricalEncoders, LabelEncoder, StandardScaler};
use crate::models::{GroupKey, Sample};

pub struct DiseaseTrainer<'a> {
    config: &'a PipelineConfig,
}

impl<'a> DiseaseTrainer<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Train the bundle for one group. Never fails: problems turn into
    /// degraded or fallback bundles and are listed in the report.
    pub fn train(
        &self,
        key: &GroupKey,
        samples: &[Sample],
        encoders: &CategoricalEncoders,
    ) -> (DiseaseBundle, GroupReport) {
        let group = key.to_string();
        let mut degradations = Vec::new();
        let labels: BTreeSet<&str> = samples.iter().map(|s| s.disease.as_str()).collect();
        let mut report = GroupReport {
            syndrome: key.syndrome,
            samples: samples.len(),
            labels: labels.len(),
            bundle: crate::models::BundleKind::Fallback,
            members: Vec::new(),
            evaluation: None,
            degradations: Vec::new(),
        };

        if labels.len() == 1 {
            let disease = labels.iter().next().map(|l| l.to_string()).unwrap_or_default();
            debug!(group = %group, disease = %disease, "Single-label group");
            let bundle = DiseaseBundle::Trivial {
                disease,
                confidence: self.config.ensemble.trivial_confidence,
            };
            report.bundle = bundle.kind();
            return (bundle, report);
        }

        let outcome = self.train_ensemble(&group, samples, encoders, &mut report);
        let bundle = match outcome.record("ensemble", &group, &mut degradations) {
            Some(ensemble) => DiseaseBundle::Ensemble(ensemble),
            None => DiseaseBundle::Fallback {
                confidence: self.config.ensemble.fallback_confidence,
            },
        };
        report.bundle = bundle.kind();
        report.degradations.extend(degradations);
        info!(
            group = %group,
            samples = samples.len(),
            bundle = ?report.bundle,
            members = report.members.len(),
            "Trained disease bundle"
        );
        (bundle, report)
    }

    fn train_ensemble(
        &self,
        group: &str,
        samples: &[Sample],
        encoders: &CategoricalEncoders,
        report: &mut GroupReport,
    ) -> StageOutcome<DiseaseEnsemble> {
        if samples.is_empty() {
            return StageOutcome::fallback(Degradation::NoTrainingData);
        }
        let species = samples[0].species();
        let syndrome = report.syndrome.as_str();
        let seed = group_seed(self.config.training.seed, species, syndrome);
        let mut rng = StdRng::seed_from_u64(seed);

        let encoder = LabelEncoder::fit(samples.iter().map(|s| s.disease.as_str()));
        let labels: Vec<&str> = samples.iter().map(|s| s.disease.as_str()).collect();
        let rows: Vec<(Vec<f64>, usize)> = samples
            .iter()
            .map(|s| (feature_vector(&s.record, encoders), encoder.encode_or_default(&s.disease)))
            .collect();

        let degradations = &mut report.degradations;
        let Some(partition) = Partitioner::new(self.config.partition.clone())
            .split(rows, &labels, &mut rng)
            .record("partition", group, degradations)
        else {
            return StageOutcome::fallback(Degradation::NoTrainingData);
        };
        if partition.train.is_empty() {
            return StageOutcome::fallback(Degradation::NoTrainingData);
        }

        let (train_x, train_y): (Vec<Vec<f64>>, Vec<usize>) = partition.train.into_iter().unzip();
        let scaler = StandardScaler::fit(&train_x);
        let scale = |rows: Vec<(Vec<f64>, usize)>| -> (Vec<Vec<f64>>, Vec<usize>) {
            rows.into_iter().map(|(x, y)| (scaler.transform(&x), y)).unzip()
        };
        let train = LabeledRows::new(scaler.transform_all(&train_x), train_y);
        let (calib_x, calib_y) = scale(partition.calibration);
        let (test_x, test_y) = scale(partition.test);

        let Some(train) = ClassBalancer::new(self.config.balance.clone())
            .balance(train, &mut rng)
            .record("balance", group, degradations)
        else {
            return StageOutcome::fallback(Degradation::NoTrainingData);
        };

        let mut members = Vec::new();
        for &learner in &self.config.ensemble.learners {
            let seed: u64 = rng.gen();
            let base = match learner.fit(&train.x, &train.y, encoder.len(), self.config, seed) {
                Ok(base) => base,
                Err(e) => {
                    StageOutcome::<()>::fallback(Degradation::LearnerFailed {
                        learner: learner.to_string(),
                        reason: e.to_string(),
                    })
                    .record("fit", group, degradations);
                    continue;
                }
            };
            if let Some(model) = Calibrator
                .calibrate(learner.as_str(), base, &calib_x, &calib_y)
                .record("calibration", group, degradations)
            {
                members.push(EnsembleMember { learner, model });
            }
        }

        if members.is_empty() {
            return StageOutcome::fallback(Degradation::NoSurvivingLearners);
        }
        report.members = members.iter().map(|m| m.learner.to_string()).collect();
        report.evaluation =
            Evaluator::new(self.config.training.top_k).evaluate(&members, &test_x, &test_y);

        StageOutcome::Ok(DiseaseEnsemble {
            members,
            encoder,
            scaler,
        })
    }
}
