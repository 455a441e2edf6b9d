//! Weighted CART trees stored as a flat node arena.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all
    pub max_features: Option<usize>,
}

/// What a tree is fit against.
pub(crate) enum Objective<'a> {
    /// Classification with Gini impurity; leaves hold class distributions.
    Gini { labels: &'a [usize], n_classes: usize },
    /// Squared-error fit of softmax residuals; leaves hold one Newton step.
    Newton { residuals: &'a [f64], n_classes: usize },
}

impl Objective<'_> {
    fn width(&self) -> usize {
        match self {
            Objective::Gini { n_classes, .. } => *n_classes,
            // sum w, sum w*r, sum w*r^2, sum w*|r|*(1-|r|)
            Objective::Newton { .. } => 4,
        }
    }

    fn accumulate(&self, stats: &mut [f64], i: usize, w: f64) {
        match self {
            Objective::Gini { labels, .. } => stats[labels[i]] += w,
            Objective::Newton { residuals, .. } => {
                let r = residuals[i];
                stats[0] += w;
                stats[1] += w * r;
                stats[2] += w * r * r;
                stats[3] += w * r.abs() * (1.0 - r.abs());
            }
        }
    }

    /// Weighted impurity (impurity times total weight), so children add up.
    fn impurity(&self, stats: &[f64]) -> f64 {
        match self {
            Objective::Gini { .. } => {
                let total: f64 = stats.iter().sum();
                if total <= 0.0 {
                    return 0.0;
                }
                total - stats.iter().map(|c| c * c).sum::<f64>() / total
            }
            Objective::Newton { .. } => {
                if stats[0] <= 0.0 {
                    return 0.0;
                }
                (stats[2] - stats[1] * stats[1] / stats[0]).max(0.0)
            }
        }
    }

    fn leaf_value(&self, stats: &[f64]) -> Vec<f64> {
        match self {
            Objective::Gini { .. } => {
                let total: f64 = stats.iter().sum();
                if total <= 0.0 {
                    return vec![1.0 / stats.len() as f64; stats.len()];
                }
                stats.iter().map(|c| c / total).collect()
            }
            Objective::Newton { n_classes, .. } => {
                let k = *n_classes as f64;
                if stats[3].abs() < 1e-150 {
                    vec![0.0]
                } else {
                    vec![(k - 1.0) / k * stats[1] / stats[3]]
                }
            }
        }
    }
}

struct Grower<'a> {
    x: &'a [Vec<f64>],
    weights: &'a [f64],
    objective: &'a Objective<'a>,
    params: TreeParams,
    n_features: usize,
}

struct Split {
    feature: usize,
    threshold: f64,
    score: f64,
}

/// A fitted decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Grow a tree over `indices` (rows may repeat only through their weight).
    pub(crate) fn fit(
        x: &[Vec<f64>],
        weights: &[f64],
        mut indices: Vec<usize>,
        objective: &Objective<'_>,
        params: TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let grower = Grower {
            x,
            weights,
            objective,
            params,
            n_features: x.first().map_or(0, Vec::len),
        };
        let mut tree = Tree { nodes: Vec::new() };
        tree.grow(&grower, &mut indices, 0, rng);
        tree
    }

    /// Leaf value reached by `x`. Missing trailing features read as 0.
    pub fn leaf(&self, x: &[f64]) -> &[f64] {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = x.get(*feature).copied().unwrap_or(0.0);
                    id = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    fn stats(&self, g: &Grower<'_>, indices: &[usize]) -> Vec<f64> {
        let mut stats = vec![0.0; g.objective.width()];
        for &i in indices {
            g.objective.accumulate(&mut stats, i, g.weights[i]);
        }
        stats
    }

    fn grow(
        &mut self,
        g: &Grower<'_>,
        indices: &mut [usize],
        depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        let stats = self.stats(g, indices);
        let impurity = g.objective.impurity(&stats);

        let stop = depth >= g.params.max_depth
            || indices.len() < g.params.min_samples_split.max(2)
            || impurity <= 1e-12;
        let split = if stop { None } else { best_split(g, indices, &stats, impurity, rng) };

        let Some(split) = split else {
            self.nodes.push(Node::Leaf {
                value: g.objective.leaf_value(&stats),
            });
            return id;
        };

        self.nodes.push(Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
        });
        let mid = partition(indices, |i| g.x[i][split.feature] <= split.threshold);
        let (lower, upper) = indices.split_at_mut(mid);
        let left_id = self.grow(g, lower, depth + 1, rng);
        let right_id = self.grow(g, upper, depth + 1, rng);
        if let Node::Split { left, right, .. } = &mut self.nodes[id] {
            *left = left_id;
            *right = right_id;
        }
        id
    }
}

/// Move rows satisfying `pred` to the front; returns their count.
fn partition(indices: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for j in 0..indices.len() {
        if pred(indices[j]) {
            indices.swap(mid, j);
            mid += 1;
        }
    }
    mid
}

fn candidate_features(g: &Grower<'_>, rng: &mut StdRng) -> Vec<usize> {
    match g.params.max_features {
        Some(m) if m < g.n_features => {
            rand::seq::index::sample(rng, g.n_features, m.max(1)).into_vec()
        }
        _ => (0..g.n_features).collect(),
    }
}

fn best_split(
    g: &Grower<'_>,
    indices: &[usize],
    total: &[f64],
    parent: f64,
    rng: &mut StdRng,
) -> Option<Split> {
    let min_leaf = g.params.min_samples_leaf.max(1);
    let n = indices.len();
    let mut best: Option<Split> = None;
    let mut sorted = indices.to_vec();

    for feature in candidate_features(g, rng) {
        sorted.sort_by(|&a, &b| g.x[a][feature].total_cmp(&g.x[b][feature]));
        let mut left = vec![0.0; total.len()];

        for pos in 0..n - 1 {
            let i = sorted[pos];
            g.objective.accumulate(&mut left, i, g.weights[i]);
            let (lo, hi) = (g.x[i][feature], g.x[sorted[pos + 1]][feature]);
            if pos + 1 < min_leaf || n - pos - 1 < min_leaf || lo >= hi {
                continue;
            }
            let right: Vec<f64> = total.iter().zip(&left).map(|(t, l)| t - l).collect();
            let score = g.objective.impurity(&left) + g.objective.impurity(&right);
            if score <= parent + 1e-12 && best.as_ref().map_or(true, |b| score < b.score - 1e-12) {
                best = Some(Split {
                    feature,
                    threshold: lo + (hi - lo) / 2.0,
                    score,
                });
            }
        }
    }
    best
}
