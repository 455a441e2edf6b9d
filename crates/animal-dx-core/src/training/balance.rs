//! Training partition rebalancing: random undersampling, then SMOTE.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use super::{Degradation, StageOutcome};
use crate::config::BalanceConfig;

/// Feature rows with their encoded labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRows {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<usize>,
}

impl LabeledRows {
    pub fn new(x: Vec<Vec<f64>>, y: Vec<usize>) -> Self {
        Self { x, y }
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Row indices per label, in label order.
    pub fn by_class(&self) -> BTreeMap<usize, Vec<usize>> {
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, &label) in self.y.iter().enumerate() {
            groups.entry(label).or_default().push(i);
        }
        groups
    }

    fn subset(&self, rows: &[usize]) -> Self {
        Self {
            x: rows.iter().map(|&i| self.x[i].clone()).collect(),
            y: rows.iter().map(|&i| self.y[i]).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassBalancer {
    config: BalanceConfig,
}

impl ClassBalancer {
    pub fn new(config: BalanceConfig) -> Self {
        Self { config }
    }

    /// Rebalance `rows`. On any resampling error the input comes back unmodified.
    pub fn balance(&self, rows: LabeledRows, rng: &mut StdRng) -> StageOutcome<LabeledRows> {
        if !self.config.enabled || rows.by_class().len() < 2 {
            return StageOutcome::Ok(rows);
        }

        let reduced = self.undersample(&rows, rng);
        let counts: Vec<usize> = reduced.by_class().values().map(Vec::len).collect();
        let min = counts.iter().copied().min().unwrap_or(0);
        let max = counts.iter().copied().max().unwrap_or(0);
        if counts.len() < 2 || min <= 1 || min == max {
            debug!(before = rows.len(), after = reduced.len(), "Undersampled");
            return StageOutcome::Ok(reduced);
        }

        // Small classes shrink the neighbourhood instead of skipping SMOTE.
        let k = self.config.smote_k_neighbors.min(min - 1);
        match smote(&reduced, k, rng) {
            Ok(balanced) => {
                debug!(
                    before = rows.len(),
                    after = balanced.len(),
                    k_neighbors = k,
                    "Undersampled and oversampled"
                );
                StageOutcome::Ok(balanced)
            }
            Err(reason) => StageOutcome::degraded(rows, Degradation::ResamplingSkipped { reason }),
        }
    }

    /// Cut each class to `ceil(minority * majority_ratio)` rows.
    fn undersample(&self, rows: &LabeledRows, rng: &mut StdRng) -> LabeledRows {
        let groups = rows.by_class();
        let minority = groups.values().map(Vec::len).min().unwrap_or(0);
        let target = ((minority as f64) * self.config.majority_ratio.max(1.0)).ceil() as usize;

        let mut keep = Vec::with_capacity(rows.len());
        for members in groups.values() {
            if members.len() > target {
                let picked = rand::seq::index::sample(rng, members.len(), target);
                keep.extend(picked.iter().map(|j| members[j]));
            } else {
                keep.extend_from_slice(members);
            }
        }
        keep.sort_unstable();
        rows.subset(&keep)
    }
}

impl Default for ClassBalancer {
    fn default() -> Self {
        Self::new(BalanceConfig::default())
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Synthesize minority rows until every class matches the largest one.
///
/// Each synthetic row lies on the segment between a random class member and
/// one of its `k` nearest same-class neighbours.
fn smote(rows: &LabeledRows, k: usize, rng: &mut StdRng) -> Result<LabeledRows, String> {
    let groups = rows.by_class();
    let max = groups.values().map(Vec::len).max().unwrap_or(0);
    let mut out = rows.clone();

    for (&label, members) in &groups {
        let need = max - members.len();
        if need == 0 {
            continue;
        }
        if k == 0 || members.len() <= k {
            return Err(format!(
                "class {} has {} samples, need more than k_neighbors = {}",
                label,
                members.len(),
                k
            ));
        }

        let neighbours: Vec<Vec<usize>> = members
            .iter()
            .map(|&i| {
                let mut others: Vec<(f64, usize)> = members
                    .iter()
                    .filter(|&&j| j != i)
                    .map(|&j| (squared_distance(&rows.x[i], &rows.x[j]), j))
                    .collect();
                others.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                others.into_iter().take(k).map(|(_, j)| j).collect()
            })
            .collect();

        for _ in 0..need {
            let m = rng.gen_range(0..members.len());
            let base = &rows.x[members[m]];
            let other = &rows.x[neighbours[m][rng.gen_range(0..k)]];
            let gap: f64 = rng.gen();
            out.x.push(base.iter().zip(other).map(|(a, b)| a + gap * (b - a)).collect());
            out.y.push(label);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rows(counts: &[usize]) -> LabeledRows {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for (label, &n) in counts.iter().enumerate() {
            for i in 0..n {
                x.push(vec![label as f64 * 10.0 + i as f64, 1.0]);
                y.push(label);
            }
        }
        LabeledRows::new(x, y)
    }

    fn class_counts(r: &LabeledRows) -> Vec<usize> {
        r.by_class().values().map(Vec::len).collect()
    }

    fn balancer(majority_ratio: f64, k: usize) -> ClassBalancer {
        ClassBalancer::new(BalanceConfig {
            enabled: true,
            majority_ratio,
            smote_k_neighbors: k,
        })
    }

    #[test]
    fn test_full_undersampling() {
        let mut rng = StdRng::seed_from_u64(1);
        let out = ClassBalancer::default().balance(rows(&[10, 3]), &mut rng);
        assert!(out.is_ok());
        assert_eq!(class_counts(out.value().unwrap()), vec![3, 3]);
    }

    #[test]
    fn test_partial_undersampling_then_smote() {
        let mut rng = StdRng::seed_from_u64(1);
        let out = balancer(2.0, 3).balance(rows(&[20, 5]), &mut rng);
        let balanced = out.value().unwrap();
        assert_eq!(class_counts(balanced), vec![10, 10]);

        // Synthetic class-1 rows stay inside the class-1 feature range.
        for (row, &label) in balanced.x.iter().zip(&balanced.y) {
            if label == 1 {
                assert!(row[0] >= 10.0 && row[0] <= 14.0);
                assert_eq!(row[1], 1.0);
            }
        }
    }

    #[test]
    fn test_small_minority_uses_fewer_neighbours() {
        let mut rng = StdRng::seed_from_u64(1);
        // Three members with k_neighbors = 5: k drops to 2 and SMOTE still runs.
        let out = balancer(3.0, 5).balance(rows(&[20, 3]), &mut rng);
        assert!(out.is_ok());
        let balanced = out.value().unwrap();
        assert_eq!(class_counts(balanced), vec![9, 9]);
        for (row, &label) in balanced.x.iter().zip(&balanced.y) {
            if label == 1 {
                assert!(row[0] >= 10.0 && row[0] <= 12.0);
            }
        }
    }

    #[test]
    fn test_smote_rejects_oversized_neighbourhood() {
        let mut rng = StdRng::seed_from_u64(1);
        let input = rows(&[6, 3]);
        assert!(smote(&input, 3, &mut rng).is_err());
        assert!(smote(&input, 0, &mut rng).is_err());
        assert_eq!(class_counts(&smote(&input, 2, &mut rng).unwrap()), vec![6, 6]);
    }

    #[test]
    fn test_single_class_and_singletons_untouched() {
        let mut rng = StdRng::seed_from_u64(1);
        let single = rows(&[4]);
        let out = ClassBalancer::default().balance(single.clone(), &mut rng);
        assert_eq!(out.value(), Some(&single));

        // Minority of one: undersample only, never below one row per class.
        let out = balancer(4.0, 5).balance(rows(&[9, 1]), &mut rng);
        assert_eq!(class_counts(out.value().unwrap()), vec![4, 1]);
    }

    #[test]
    fn test_disabled_is_noop() {
        let mut rng = StdRng::seed_from_u64(1);
        let b = ClassBalancer::new(BalanceConfig {
            enabled: false,
            ..BalanceConfig::default()
        });
        let input = rows(&[10, 2]);
        assert_eq!(b.balance(input.clone(), &mut rng).value(), Some(&input));
    }
}
