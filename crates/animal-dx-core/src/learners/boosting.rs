//! Multinomial (softmax) gradient boosting.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::tree::{Objective, Tree, TreeParams};
use super::{argmax, balanced_weights, check_training_set, Classifier, LearnerError, LearnerResult};
use crate::config::BoostingConfig;

/// Row fraction used by the weighted variant.
pub const WEIGHTED_SUBSAMPLE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub subsample: f64,
    /// Balanced per-row sample weights
    pub balanced: bool,
}

impl From<&BoostingConfig> for BoostingParams {
    fn from(c: &BoostingConfig) -> Self {
        Self {
            n_estimators: c.n_estimators,
            learning_rate: c.learning_rate,
            max_depth: c.max_depth,
            subsample: c.subsample,
            balanced: false,
        }
    }
}

impl BoostingParams {
    /// Balanced weights and [`WEIGHTED_SUBSAMPLE`] row sampling.
    pub fn weighted(c: &BoostingConfig) -> Self {
        Self {
            subsample: c.subsample.min(WEIGHTED_SUBSAMPLE),
            balanced: true,
            ..Self::from(c)
        }
    }
}

/// One regression tree per present class per boosting stage.
///
/// Classes absent from the training rows are not modelled and always get
/// probability 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    n_classes: usize,
    /// Label index of each modelled class
    classes: Vec<usize>,
    init: Vec<f64>,
    learning_rate: f64,
    stages: Vec<Vec<Tree>>,
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

impl GradientBoosting {
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        params: &BoostingParams,
        seed: u64,
    ) -> LearnerResult<Self> {
        check_training_set(x, y, n_classes)?;
        if params.n_estimators == 0 || !(params.learning_rate > 0.0) {
            return Err(LearnerError::InvalidParameter(
                "boosting needs n_estimators >= 1 and a positive learning rate".into(),
            ));
        }
        if !(params.subsample > 0.0 && params.subsample <= 1.0) {
            return Err(LearnerError::InvalidParameter(format!(
                "subsample must be in (0, 1], got {}",
                params.subsample
            )));
        }

        let n = y.len();
        let weights = if params.balanced {
            balanced_weights(y, n_classes)
        } else {
            vec![1.0; n]
        };

        let mut class_weight = vec![0.0; n_classes];
        for (&label, w) in y.iter().zip(&weights) {
            class_weight[label] += w;
        }
        let classes: Vec<usize> = (0..n_classes).filter(|&c| class_weight[c] > 0.0).collect();
        let total: f64 = class_weight.iter().sum();
        let init: Vec<f64> = classes.iter().map(|&c| (class_weight[c] / total).ln()).collect();

        let mut model = Self {
            n_classes,
            classes,
            init,
            learning_rate: params.learning_rate,
            stages: Vec::new(),
        };
        let k = model.classes.len();
        if k < 2 {
            return Ok(model);
        }

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        };
        let mut rng = StdRng::seed_from_u64(seed);
        let n_sub = ((params.subsample * n as f64) as usize).clamp(1, n);
        let mut scores: Vec<Vec<f64>> = vec![model.init.clone(); n];
        let mut residuals = vec![vec![0.0; n]; k];

        for _ in 0..params.n_estimators {
            for (i, row) in scores.iter().enumerate() {
                let p = softmax(row);
                for (j, &class) in model.classes.iter().enumerate() {
                    let target = if y[i] == class { 1.0 } else { 0.0 };
                    residuals[j][i] = target - p[j];
                }
            }

            let rows: Vec<usize> = if n_sub < n {
                let mut sampled = rand::seq::index::sample(&mut rng, n, n_sub).into_vec();
                sampled.sort_unstable();
                sampled
            } else {
                (0..n).collect()
            };

            let mut stage = Vec::with_capacity(k);
            for r in &residuals {
                let objective = Objective::Newton {
                    residuals: r,
                    n_classes: k,
                };
                stage.push(Tree::fit(x, &weights, rows.clone(), &objective, tree_params, &mut rng));
            }
            for (i, row) in scores.iter_mut().enumerate() {
                for (s, tree) in row.iter_mut().zip(&stage) {
                    *s += params.learning_rate * tree.leaf(&x[i])[0];
                }
            }
            model.stages.push(stage);
        }

        Ok(model)
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    fn raw_scores(&self, x: &[f64]) -> Vec<f64> {
        let mut scores = self.init.clone();
        for stage in &self.stages {
            for (s, tree) in scores.iter_mut().zip(stage) {
                *s += self.learning_rate * tree.leaf(x)[0];
            }
        }
        scores
    }
}

impl Classifier for GradientBoosting {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict(&self, x: &[f64]) -> usize {
        self.predict_proba(x).map_or(0, |p| argmax(&p))
    }

    fn predict_proba(&self, x: &[f64]) -> Option<Vec<f64>> {
        let mut proba = vec![0.0; self.n_classes];
        for (&class, p) in self.classes.iter().zip(softmax(&self.raw_scores(x))) {
            proba[class] = p;
        }
        Some(proba)
    }
}
