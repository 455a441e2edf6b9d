//! Bootstrap random forest.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{Objective, Tree, TreeParams};
use super::{argmax, balanced_weights, check_training_set, Classifier, LearnerError, LearnerResult};
use crate::config::ForestConfig;

/// Bagged Gini trees with sqrt feature subsampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<Tree>,
    n_classes: usize,
}

impl RandomForest {
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        config: &ForestConfig,
        seed: u64,
    ) -> LearnerResult<Self> {
        let width = check_training_set(x, y, n_classes)?;
        if config.n_estimators == 0 {
            return Err(LearnerError::InvalidParameter("n_estimators must be at least 1".into()));
        }

        let class_weights = if config.class_weighted {
            balanced_weights(y, n_classes)
        } else {
            vec![1.0; y.len()]
        };
        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: Some(((width as f64).sqrt() as usize).max(1)),
        };
        let objective = Objective::Gini { labels: y, n_classes };
        let mut rng = StdRng::seed_from_u64(seed);
        let n = y.len();

        let mut trees = Vec::with_capacity(config.n_estimators);
        for _ in 0..config.n_estimators {
            let mut counts = vec![0u32; n];
            for _ in 0..n {
                counts[rng.gen_range(0..n)] += 1;
            }
            let in_bag: Vec<usize> = (0..n).filter(|&i| counts[i] > 0).collect();
            let weights: Vec<f64> = counts
                .iter()
                .zip(&class_weights)
                .map(|(c, w)| f64::from(*c) * w)
                .collect();
            trees.push(Tree::fit(x, &weights, in_bag, &objective, params, &mut rng));
        }

        Ok(Self { trees, n_classes })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict(&self, x: &[f64]) -> usize {
        self.predict_proba(x).map_or(0, |p| argmax(&p))
    }

    fn predict_proba(&self, x: &[f64]) -> Option<Vec<f64>> {
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, v) in proba.iter_mut().zip(tree.leaf(x)) {
                *p += v;
            }
        }
        let n = self.trees.len().max(1) as f64;
        for p in &mut proba {
            *p /= n;
        }
        Some(proba)
    }
}
