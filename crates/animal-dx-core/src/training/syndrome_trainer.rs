//! Stage-1 trainer: one class-weighted forest per species over syndrome labels.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use super::{group_seed, Calibrator, Degradation, Evaluation, Evaluator, Partitioner, StageOutcome};
use crate::artifacts::SyndromeModel;
use crate::config::PipelineConfig;
use crate::features::{
    feature_vector, CategoricalEncoders, ClinicalFeatures, LabelEncoder, StandardScaler,
};
use crate::learners::LearnerKind;
use crate::models::Sample;

#[derive(Debug, Clone)]
pub struct SyndromeTraining {
    pub model: SyndromeModel,
    pub evaluation: Option<Evaluation>,
    pub degradations: Vec<Degradation>,
}

pub struct SyndromeTrainer<'a> {
    config: &'a PipelineConfig,
}

impl<'a> SyndromeTrainer<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Train the species' syndrome classifier, or fall back when the species is too small.
    pub fn train(
        &self,
        species: &str,
        samples: &[Sample],
        encoders: &CategoricalEncoders,
    ) -> StageOutcome<SyndromeTraining> {
        let required = self.config.training.min_species_samples;
        if samples.len() < required {
            return StageOutcome::fallback(Degradation::TooFewSamples {
                samples: samples.len(),
                required,
            });
        }

        let labels: Vec<&'static str> = samples
            .iter()
            .map(|s| ClinicalFeatures::derive(&s.record).syndrome.as_str())
            .collect();
        let encoder = LabelEncoder::fit(&labels);
        let rows: Vec<(Vec<f64>, usize)> = samples
            .iter()
            .zip(&labels)
            .map(|(s, l)| (feature_vector(&s.record, encoders), encoder.encode_or_default(l)))
            .collect();

        let group = format!("{}/syndrome", species);
        let mut degradations = Vec::new();
        let seed = group_seed(self.config.training.seed, species, "syndrome");
        let mut rng = StdRng::seed_from_u64(seed);

        let partition = match Partitioner::new(self.config.partition.clone())
            .split(rows, &labels, &mut rng)
            .record("partition", &group, &mut degradations)
        {
            Some(p) => p,
            None => return StageOutcome::fallback(Degradation::NoTrainingData),
        };

        let (train_x, train_y): (Vec<Vec<f64>>, Vec<usize>) = partition.train.into_iter().unzip();
        let scaler = StandardScaler::fit(&train_x);
        let scale = |rows: Vec<(Vec<f64>, usize)>| -> (Vec<Vec<f64>>, Vec<usize>) {
            rows.into_iter().map(|(x, y)| (scaler.transform(&x), y)).unzip()
        };
        let train_x = scaler.transform_all(&train_x);
        let (calib_x, calib_y) = scale(partition.calibration);
        let (test_x, test_y) = scale(partition.test);

        let learner = LearnerKind::RandomForest;
        let learner_seed = rng_seed(&mut rng);
        let fitted = learner.fit(&train_x, &train_y, encoder.len(), self.config, learner_seed);
        let base = match fitted {
            Ok(base) => base,
            Err(e) => {
                return StageOutcome::fallback(Degradation::LearnerFailed {
                    learner: learner.to_string(),
                    reason: e.to_string(),
                })
            }
        };
        let Some(classifier) = Calibrator
            .calibrate(learner.as_str(), base, &calib_x, &calib_y)
            .record("calibration", &group, &mut degradations)
        else {
            return StageOutcome::fallback(Degradation::NoSurvivingLearners);
        };

        let evaluation = Evaluator::new(self.config.training.top_k).evaluate(
            std::slice::from_ref(&classifier),
            &test_x,
            &test_y,
        );
        info!(
            species,
            samples = samples.len(),
            syndromes = encoder.len(),
            top1 = evaluation.as_ref().map(|e| e.top1_accuracy),
            "Trained syndrome classifier"
        );

        StageOutcome::Ok(SyndromeTraining {
            model: SyndromeModel {
                classifier,
                encoder,
                scaler,
            },
            evaluation,
            degradations,
        })
    }
}

fn rng_seed(rng: &mut StdRng) -> u64 {
    rand::Rng::gen(rng)
}
