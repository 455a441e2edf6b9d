//! Held-out sigmoid (Platt) calibration of prefit learners.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::{Degradation, StageOutcome};
use crate::learners::{argmax, probabilities, BaseLearner, Classifier};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("No calibration samples")]
    NoData,

    #[error("Newton solver did not converge in {0} iterations")]
    NotConverged(usize),

    #[error("Line search failed")]
    LineSearchFailed,

    #[error("Singular Hessian")]
    Singular,

    #[error("Non-finite sigmoid parameters")]
    NonFinite,
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;

const MAX_ITERATIONS: usize = 100;
const MIN_STEP: f64 = 1e-10;
const SIGMA: f64 = 1e-12;
const EPSILON: f64 = 1e-5;

/// `p = 1 / (1 + exp(a * f + b))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattScaler {
    pub a: f64,
    pub b: f64,
}

/// Negative log-likelihood term, split by sign for numerical stability.
fn nll_term(target: f64, f_apb: f64) -> f64 {
    if f_apb >= 0.0 {
        target * f_apb + (-f_apb).exp().ln_1p()
    } else {
        (target - 1.0) * f_apb + f_apb.exp().ln_1p()
    }
}

impl PlattScaler {
    /// Fit on scores with binary targets using Platt's smoothed labels.
    pub fn fit(scores: &[f64], positive: &[bool]) -> CalibrationResult<Self> {
        if scores.is_empty() {
            return Err(CalibrationError::NoData);
        }
        let n_pos = positive.iter().filter(|p| **p).count() as f64;
        let n_neg = positive.len() as f64 - n_pos;
        let hi = (n_pos + 1.0) / (n_pos + 2.0);
        let lo = 1.0 / (n_neg + 2.0);
        let targets: Vec<f64> = positive.iter().map(|&p| if p { hi } else { lo }).collect();

        let objective = |a: f64, b: f64| -> f64 {
            scores
                .iter()
                .zip(&targets)
                .map(|(f, t)| nll_term(*t, f * a + b))
                .sum()
        };

        let mut a = 0.0;
        let mut b = ((n_neg + 1.0) / (n_pos + 1.0)).ln();
        let mut fval = objective(a, b);

        for iteration in 0..MAX_ITERATIONS {
            let (mut h11, mut h22, mut h21, mut g1, mut g2) = (SIGMA, SIGMA, 0.0, 0.0, 0.0);
            for (f, t) in scores.iter().zip(&targets) {
                let f_apb = f * a + b;
                let (p, q) = if f_apb >= 0.0 {
                    let e = (-f_apb).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = f_apb.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = t - p;
                g1 += f * d1;
                g2 += d1;
            }

            if g1.abs() < EPSILON && g2.abs() < EPSILON {
                debug!(iterations = iteration, a, b, "Platt fit converged");
                return Self::finite(a, b);
            }

            let det = h11 * h22 - h21 * h21;
            if det.abs() < f64::MIN_POSITIVE {
                return Err(CalibrationError::Singular);
            }
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0;
            loop {
                if step < MIN_STEP {
                    return Err(CalibrationError::LineSearchFailed);
                }
                let (na, nb) = (a + step * da, b + step * db);
                let nf = objective(na, nb);
                if nf < fval + 1e-4 * step * gd {
                    a = na;
                    b = nb;
                    fval = nf;
                    break;
                }
                step /= 2.0;
            }
        }
        Err(CalibrationError::NotConverged(MAX_ITERATIONS))
    }

    fn finite(a: f64, b: f64) -> CalibrationResult<Self> {
        if a.is_finite() && b.is_finite() {
            Ok(Self { a, b })
        } else {
            Err(CalibrationError::NonFinite)
        }
    }

    pub fn apply(&self, score: f64) -> f64 {
        let z = self.a * score + self.b;
        if z >= 0.0 {
            let e = (-z).exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + z.exp())
        }
    }
}

/// Per-class sigmoid maps for one learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Calibration {
    /// Two classes: calibrate the positive class, the negative is its complement
    Binary { scaler: PlattScaler },
    OneVsRest { scalers: Vec<PlattScaler> },
}

impl Calibration {
    /// Fit on the learner's probabilities for the calibration rows.
    pub fn fit<C: Classifier + ?Sized>(
        model: &C,
        x: &[Vec<f64>],
        y: &[usize],
    ) -> CalibrationResult<Self> {
        if x.is_empty() {
            return Err(CalibrationError::NoData);
        }
        let probs: Vec<Vec<f64>> = x.iter().map(|row| probabilities(model, row)).collect();
        let n_classes = model.n_classes();

        let column = |c: usize| -> (Vec<f64>, Vec<bool>) {
            (
                probs.iter().map(|p| p.get(c).copied().unwrap_or(0.0)).collect(),
                y.iter().map(|&label| label == c).collect(),
            )
        };

        if n_classes == 2 {
            let (scores, positive) = column(1);
            return Ok(Calibration::Binary {
                scaler: PlattScaler::fit(&scores, &positive)?,
            });
        }
        let scalers = (0..n_classes)
            .map(|c| {
                let (scores, positive) = column(c);
                PlattScaler::fit(&scores, &positive)
            })
            .collect::<CalibrationResult<Vec<_>>>()?;
        Ok(Calibration::OneVsRest { scalers })
    }

    pub fn apply(&self, raw: &[f64]) -> Vec<f64> {
        match self {
            Calibration::Binary { scaler } => {
                let p = scaler.apply(raw.get(1).copied().unwrap_or(0.0));
                vec![1.0 - p, p]
            }
            Calibration::OneVsRest { scalers } => {
                let calibrated: Vec<f64> = scalers
                    .iter()
                    .zip(raw)
                    .map(|(s, p)| s.apply(*p))
                    .collect();
                let sum: f64 = calibrated.iter().sum();
                if sum > 0.0 {
                    calibrated.into_iter().map(|p| p / sum).collect()
                } else {
                    vec![1.0 / calibrated.len().max(1) as f64; calibrated.len()]
                }
            }
        }
    }
}

/// A base learner plus its optional calibration layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedModel {
    pub base: BaseLearner,
    pub calibration: Option<Calibration>,
}

impl CalibratedModel {
    pub fn uncalibrated(base: BaseLearner) -> Self {
        Self {
            base,
            calibration: None,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }
}

impl Classifier for CalibratedModel {
    fn n_classes(&self) -> usize {
        self.base.n_classes()
    }

    fn predict(&self, x: &[f64]) -> usize {
        match &self.calibration {
            Some(_) => self.predict_proba(x).map_or(0, |p| argmax(&p)),
            None => self.base.predict(x),
        }
    }

    fn predict_proba(&self, x: &[f64]) -> Option<Vec<f64>> {
        let raw = probabilities(&self.base, x);
        Some(match &self.calibration {
            Some(c) => c.apply(&raw),
            None => raw,
        })
    }
}

/// Wraps prefit learners with a calibration layer fit on held-out rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct Calibrator;

impl Calibrator {
    /// Calibrate `base`; falls back to the raw learner without data or on failure.
    pub fn calibrate(
        &self,
        learner: &str,
        base: BaseLearner,
        x: &[Vec<f64>],
        y: &[usize],
    ) -> StageOutcome<CalibratedModel> {
        if x.is_empty() {
            return StageOutcome::degraded(
                CalibratedModel::uncalibrated(base),
                Degradation::NoCalibrationData,
            );
        }
        match Calibration::fit(&base, x, y) {
            Ok(calibration) => StageOutcome::Ok(CalibratedModel {
                base,
                calibration: Some(calibration),
            }),
            Err(e) => StageOutcome::degraded(
                CalibratedModel::uncalibrated(base),
                Degradation::CalibrationFailed {
                    learner: learner.to_string(),
                    reason: e.to_string(),
                },
            ),
        }
    }
}
