//! Ensemble probability averaging and top-k evaluation.

use serde::{Deserialize, Serialize};

use crate::learners::{probabilities, Classifier};

/// Arithmetic mean of the members' probability vectors (one-hot for members
/// without probabilities). Empty for an empty ensemble.
pub fn average_probabilities<C: Classifier>(members: &[C], x: &[f64]) -> Vec<f64> {
    let Some(first) = members.first() else {
        return Vec::new();
    };
    let mut mean = vec![0.0; first.n_classes()];
    for member in members {
        for (m, p) in mean.iter_mut().zip(probabilities(member, x)) {
            *m += p;
        }
    }
    let n = members.len() as f64;
    for m in &mut mean {
        *m /= n;
    }
    mean
}

/// Indices of the `k` largest probabilities: descending probability, then ascending index.
///
/// `top_k(p, 1)[0]` is the argmax, so top-k membership always includes the top-1 pick.
pub fn top_k(probs: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]).then(a.cmp(&b)));
    order.truncate(k);
    order
}

/// Accuracy figures on one test partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub samples: usize,
    pub k: usize,
    pub top1_accuracy: f64,
    pub topk_accuracy: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    k: usize,
}

impl Evaluator {
    pub fn new(k: usize) -> Self {
        Self { k: k.max(1) }
    }

    /// Evaluate an ensemble; `None` without test rows or members.
    pub fn evaluate<C: Classifier>(
        &self,
        members: &[C],
        x: &[Vec<f64>],
        y: &[usize],
    ) -> Option<Evaluation> {
        if x.is_empty() || members.is_empty() {
            return None;
        }
        let mut top1 = 0usize;
        let mut topk = 0usize;
        for (row, &truth) in x.iter().zip(y) {
            let ranked = top_k(&average_probabilities(members, row), self.k);
            if ranked.first() == Some(&truth) {
                top1 += 1;
            }
            if ranked.contains(&truth) {
                topk += 1;
            }
        }
        let n = x.len() as f64;
        Some(Evaluation {
            samples: x.len(),
            k: self.k,
            top1_accuracy: top1 as f64 / n,
            topk_accuracy: topk as f64 / n,
        })
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(3)
    }
}
