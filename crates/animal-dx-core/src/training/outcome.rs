//! Tagged stage results for the group-level fallback chain.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Why a stage degraded or fell back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Group too small for the operation; everything went to training
    TooFewSamples { samples: usize, required: usize },
    /// A class was too small to stratify; a random split was used
    Unstratified { split: String },
    NoCalibrationData,
    CalibrationFailed { learner: String, reason: String },
    /// Balancing failed; the training partition is used unmodified
    ResamplingSkipped { reason: String },
    LearnerFailed { learner: String, reason: String },
    NoTrainingData,
    NoSurvivingLearners,
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::TooFewSamples { samples, required } => {
                write!(f, "too few samples ({} < {})", samples, required)
            }
            Degradation::Unstratified { split } => write!(f, "{} split not stratified", split),
            Degradation::NoCalibrationData => f.write_str("no calibration data"),
            Degradation::CalibrationFailed { learner, reason } => {
                write!(f, "calibration of {} failed: {}", learner, reason)
            }
            Degradation::ResamplingSkipped { reason } => {
                write!(f, "resampling skipped: {}", reason)
            }
            Degradation::LearnerFailed { learner, reason } => {
                write!(f, "{} failed: {}", learner, reason)
            }
            Degradation::NoTrainingData => f.write_str("no training data"),
            Degradation::NoSurvivingLearners => f.write_str("no base learner could be trained"),
        }
    }
}

/// Result of one pipeline stage for one group.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Ok(T),
    /// Usable, but produced through a fallback path
    Degraded { value: T, reason: Degradation },
    /// Nothing usable; the caller substitutes its own fallback
    Fallback { reason: Degradation },
}

impl<T> StageOutcome<T> {
    pub fn degraded(value: T, reason: Degradation) -> Self {
        StageOutcome::Degraded { value, reason }
    }

    pub fn fallback(reason: Degradation) -> Self {
        StageOutcome::Fallback { reason }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StageOutcome::Ok(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            StageOutcome::Ok(v) | StageOutcome::Degraded { value: v, .. } => Some(v),
            StageOutcome::Fallback { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&Degradation> {
        match self {
            StageOutcome::Ok(_) => None,
            StageOutcome::Degraded { reason, .. } | StageOutcome::Fallback { reason } => {
                Some(reason)
            }
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutcome<U> {
        match self {
            StageOutcome::Ok(v) => StageOutcome::Ok(f(v)),
            StageOutcome::Degraded { value, reason } => StageOutcome::Degraded {
                value: f(value),
                reason,
            },
            StageOutcome::Fallback { reason } => StageOutcome::Fallback { reason },
        }
    }

    /// Log any degradation once under `group`, append it to `sink`, and return the value.
    pub fn record(
        self,
        stage: &'static str,
        group: &str,
        sink: &mut Vec<Degradation>,
    ) -> Option<T> {
        match self {
            StageOutcome::Ok(v) => Some(v),
            StageOutcome::Degraded { value, reason } => {
                warn!(stage, group, reason = %reason, "Stage degraded");
                sink.push(reason);
                Some(value)
            }
            StageOutcome::Fallback { reason } => {
                warn!(stage, group, reason = %reason, "Stage fell back");
                sink.push(reason);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_collects_reasons() {
        let mut sink = Vec::new();
        assert_eq!(StageOutcome::Ok(1).record("test", "g", &mut sink), Some(1));
        assert!(sink.is_empty());

        let degraded = StageOutcome::degraded(2, Degradation::NoCalibrationData);
        assert_eq!(degraded.reason(), Some(&Degradation::NoCalibrationData));
        assert_eq!(degraded.record("test", "g", &mut sink), Some(2));

        let fallback: StageOutcome<i32> = StageOutcome::fallback(Degradation::NoTrainingData);
        assert_eq!(fallback.value(), None);
        assert_eq!(fallback.record("test", "g", &mut sink), None);
        assert_eq!(sink, vec![Degradation::NoCalibrationData, Degradation::NoTrainingData]);
    }

    #[test]
    fn test_map_keeps_reason() {
        let out = StageOutcome::degraded(2, Degradation::NoTrainingData).map(|v| v * 10);
        assert_eq!(out.value(), Some(&20));
        assert!(!out.is_ok());
    }

    #[test]
    fn test_degradation_serializes_tagged() {
        let reason = Degradation::TooFewSamples {
            samples: 2,
            required: 3,
        };
        let json = serde_json::to_string(&reason).unwrap();
        assert_eq!(json, r#"{"kind":"too_few_samples","samples":2,"required":3}"#);
    }
}
