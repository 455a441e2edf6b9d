//! Syndrome categories and rule-based syndrome scoring.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SymptomFlags;

/// Score above which a syndrome group counts as implicated.
pub const IMPLICATION_THRESHOLD: f64 = 2.0;

/// Coarse symptom-cluster category predicted by the first stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Syndrome {
    Respiratory,
    #[serde(rename = "GI")]
    Gi,
    Dermatological,
    Neurological,
    Systemic,
    Multi,
}

impl Syndrome {
    /// Every syndrome, in canonical order.
    pub const ALL: [Syndrome; 6] = [
        Syndrome::Respiratory,
        Syndrome::Gi,
        Syndrome::Dermatological,
        Syndrome::Neurological,
        Syndrome::Systemic,
        Syndrome::Multi,
    ];

    /// Display / file-name form (e.g. "GI", "Respiratory").
    pub fn as_str(&self) -> &'static str {
        match self {
            Syndrome::Respiratory => "Respiratory",
            Syndrome::Gi => "GI",
            Syndrome::Dermatological => "Dermatological",
            Syndrome::Neurological => "Neurological",
            Syndrome::Systemic => "Systemic",
            Syndrome::Multi => "Multi",
        }
    }
}

impl fmt::Display for Syndrome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a syndrome.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Unknown syndrome: {0}")]
pub struct UnknownSyndrome(pub String);

impl FromStr for Syndrome {
    type Err = UnknownSyndrome;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "respiratory" => Ok(Syndrome::Respiratory),
            "gi" | "gastrointestinal" => Ok(Syndrome::Gi),
            "dermatological" => Ok(Syndrome::Dermatological),
            "neurological" => Ok(Syndrome::Neurological),
            "systemic" => Ok(Syndrome::Systemic),
            "multi" => Ok(Syndrome::Multi),
            _ => Err(UnknownSyndrome(s.to_string())),
        }
    }
}

/// Weighted syndrome scores for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyndromeScores {
    pub respiratory: f64,
    pub gi: f64,
    pub systemic: f64,
    pub dermatological: f64,
    pub neurological: f64,
}

impl SyndromeScores {
    /// Compute scores from symptom flags and the signed temperature status.
    ///
    /// Weights:
    /// - Respiratory = 3·cough + 4·labored breathing + 2·nasal + 1·eye discharge
    /// - GI = 4·vomiting + 3·diarrhea + 2·appetite loss
    /// - Systemic = 3·|temperature abnormal| + 2·appetite loss
    /// - Dermatological = 3·skin lesions
    /// - Neurological = 3·lameness
    pub fn compute(flags: &SymptomFlags, temp_abnormal: i8) -> Self {
        let f = |b: bool| if b { 1.0 } else { 0.0 };
        Self {
            respiratory: 3.0 * f(flags.coughing)
                + 4.0 * f(flags.labored_breathing)
                + 2.0 * f(flags.nasal_discharge)
                + f(flags.eye_discharge),
            gi: 4.0 * f(flags.vomiting) + 3.0 * f(flags.diarrhea) + 2.0 * f(flags.appetite_loss),
            systemic: 3.0 * f64::from(temp_abnormal.unsigned_abs()) + 2.0 * f(flags.appetite_loss),
            dermatological: 3.0 * f(flags.skin_lesions),
            neurological: 3.0 * f(flags.lameness),
        }
    }

    /// Scores paired with the syndrome they implicate.
    fn ranked(&self) -> [(Syndrome, f64); 5] {
        [
            (Syndrome::Respiratory, self.respiratory),
            (Syndrome::Gi, self.gi),
            (Syndrome::Dermatological, self.dermatological),
            (Syndrome::Neurological, self.neurological),
            (Syndrome::Systemic, self.systemic),
        ]
    }

    /// Syndromes whose score exceeds [`IMPLICATION_THRESHOLD`].
    pub fn implicated(&self) -> Vec<Syndrome> {
        self.ranked()
            .into_iter()
            .filter(|(_, score)| *score > IMPLICATION_THRESHOLD)
            .map(|(s, _)| s)
            .collect()
    }

    /// Assign exactly one syndrome label.
    ///
    /// One implicated group → that syndrome. Zero or several → `Multi`.
    pub fn label(&self) -> Syndrome {
        match self.implicated().as_slice() {
            [single] => *single,
            _ => Syndrome::Multi,
        }
    }

    /// True when at least two of respiratory, GI, systemic, neurological exceed the threshold.
    pub fn multi_system(&self) -> bool {
        [self.respiratory, self.gi, self.systemic, self.neurological]
            .iter()
            .filter(|s| **s > IMPLICATION_THRESHOLD)
            .count()
            >= 2
    }
}

/// Duration-only condition severity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionSeverity {
    Acute,
    Subacute,
    Chronic,
}

impl ConditionSeverity {
    /// ≤3 days → Acute, >14 days → Chronic, otherwise Subacute.
    pub fn from_duration_days(days: f64) -> Self {
        if days <= 3.0 {
            ConditionSeverity::Acute
        } else if days > 14.0 {
            ConditionSeverity::Chronic
        } else {
            ConditionSeverity::Subacute
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionSeverity::Acute => "Acute",
            ConditionSeverity::Subacute => "Subacute",
            ConditionSeverity::Chronic => "Chronic",
        }
    }
}
