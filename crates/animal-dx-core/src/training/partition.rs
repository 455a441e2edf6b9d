//! Train / calibration / test partitioning with degenerate-group fallbacks.
//!
//! Order of preference:
//! 1. Too small to split → everything is training data
//! 2. Stratified test split, then stratified calibration split of the rest
//! 3. Random split of the same size when a class is too small to stratify
//! 4. Calibration shrinks (down to nothing) before training loses its last row

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use super::{Degradation, StageOutcome};
use crate::config::PartitionConfig;

/// The three partitions of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<T> {
    pub train: Vec<T>,
    pub calibration: Vec<T>,
    pub test: Vec<T>,
}

impl<T> Partition<T> {
    pub fn len(&self) -> usize {
        self.train.len() + self.calibration.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Train,
    Calibration,
    Test,
}

#[derive(Debug, Clone)]
pub struct Partitioner {
    config: PartitionConfig,
}

impl Partitioner {
    pub fn new(config: PartitionConfig) -> Self {
        Self { config }
    }

    /// Split `items`, stratifying on the parallel `labels` slice.
    pub fn split<T, L: Ord>(
        &self,
        items: Vec<T>,
        labels: &[L],
        rng: &mut StdRng,
    ) -> StageOutcome<Partition<T>> {
        debug_assert_eq!(items.len(), labels.len());
        let n = items.len();
        let required = self.config.min_split_samples.max(3);
        if n < required {
            debug!(samples = n, required, "Group too small to split");
            return StageOutcome::degraded(
                Partition {
                    train: items,
                    calibration: Vec::new(),
                    test: Vec::new(),
                },
                Degradation::TooFewSamples { samples: n, required },
            );
        }

        // Dense class ids in sorted label order.
        let names: BTreeMap<&L, usize> = {
            let mut sorted: Vec<&L> = labels.iter().collect();
            sorted.sort_unstable();
            sorted.dedup();
            sorted.into_iter().enumerate().map(|(i, l)| (l, i)).collect()
        };
        let classes: Vec<usize> = labels.iter().map(|l| names[l]).collect();

        let mut parts = vec![Part::Train; n];
        let mut reason = None;

        // Test partition.
        let all: Vec<usize> = (0..n).collect();
        let n_test = ceil_fraction(self.config.test_fraction, n).min(n - 1);
        if n_test > 0 {
            let (picked, stratified) = take(&all, &classes, n_test, rng);
            if !stratified {
                reason.get_or_insert(Degradation::Unstratified { split: "test".into() });
            }
            for i in picked {
                parts[i] = Part::Test;
            }
        }

        // Calibration out of the remainder, expressed relative to it.
        let remaining: Vec<usize> = (0..n).filter(|&i| parts[i] == Part::Train).collect();
        let relative = if self.config.test_fraction < 1.0 {
            self.config.calibration_fraction / (1.0 - self.config.test_fraction)
        } else {
            0.0
        };
        let n_calib = if remaining.len() < 2 {
            0
        } else {
            ceil_fraction(relative, remaining.len()).min(remaining.len() - 1)
        };
        if n_calib > 0 {
            let (picked, stratified) = take(&remaining, &classes, n_calib, rng);
            if !stratified {
                reason.get_or_insert(Degradation::Unstratified {
                    split: "calibration".into(),
                });
            }
            for i in picked {
                parts[i] = Part::Calibration;
            }
        }

        let mut partition = Partition {
            train: Vec::new(),
            calibration: Vec::new(),
            test: Vec::new(),
        };
        for (item, part) in items.into_iter().zip(parts) {
            match part {
                Part::Train => partition.train.push(item),
                Part::Calibration => partition.calibration.push(item),
                Part::Test => partition.test.push(item),
            }
        }
        debug!(
            train = partition.train.len(),
            calibration = partition.calibration.len(),
            test = partition.test.len(),
            "Partitioned group"
        );

        match reason {
            None => StageOutcome::Ok(partition),
            Some(reason) => StageOutcome::degraded(partition, reason),
        }
    }
}

impl Default for Partitioner {
    fn default() -> Self {
        Self::new(PartitionConfig::default())
    }
}

fn ceil_fraction(fraction: f64, n: usize) -> usize {
    if fraction <= 0.0 {
        0
    } else {
        (fraction * n as f64 - 1e-9).ceil().max(0.0) as usize
    }
}

/// Pick `count` of `pool`, stratified when possible. Returns (picked, stratified).
fn take(pool: &[usize], classes: &[usize], count: usize, rng: &mut StdRng) -> (Vec<usize>, bool) {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &i in pool {
        by_class.entry(classes[i]).or_default().push(i);
    }
    let k = by_class.len();
    let stratifiable =
        by_class.values().all(|m| m.len() >= 2) && count >= k && pool.len() - count >= k;

    let mut picked = if stratifiable {
        let counts: Vec<usize> = by_class.values().map(Vec::len).collect();
        let alloc = allocate(&counts, count);
        let mut picked = Vec::with_capacity(count);
        for (members, want) in by_class.into_values().zip(alloc) {
            let mut members = members;
            members.shuffle(rng);
            picked.extend(members.into_iter().take(want));
        }
        picked
    } else {
        let mut shuffled = pool.to_vec();
        shuffled.shuffle(rng);
        shuffled.truncate(count);
        shuffled
    };
    picked.sort_unstable();
    (picked, stratifiable)
}

/// Proportional per-class allocation summing to `total`, leaving every class one member.
///
/// Largest remainders get the leftover slots; ties go to the lower class id.
fn allocate(counts: &[usize], total: usize) -> Vec<usize> {
    let n: usize = counts.iter().sum();
    let mut alloc: Vec<usize> = counts
        .iter()
        .map(|&m| (total * m / n).min(m.saturating_sub(1)))
        .collect();
    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by_key(|&c| std::cmp::Reverse((total * counts[c]) % n));

    let mut left = total.saturating_sub(alloc.iter().sum());
    while left > 0 {
        let mut progressed = false;
        for &c in &order {
            if left == 0 {
                break;
            }
            if alloc[c] + 1 < counts[c] {
                alloc[c] += 1;
                left -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    alloc
}
