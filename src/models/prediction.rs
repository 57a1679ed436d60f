use crate::models::AssetKind;
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

/// Binary outcome of a risk prediction. Serialized as 0 (safe) or 1 (failure risk).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(into = "u8", try_from = "u8")]
pub enum RiskClass {
    Safe,
    FailureRisk,
}

impl RiskClass {
    pub fn as_u8(self) -> u8 {
        match self {
            RiskClass::Safe => 0,
            RiskClass::FailureRisk => 1,
        }
    }

    pub fn is_failure_risk(self) -> bool {
        self == RiskClass::FailureRisk
    }
}

impl From<RiskClass> for u8 {
    fn from(class: RiskClass) -> Self {
        class.as_u8()
    }
}

impl TryFrom<u8> for RiskClass {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RiskClass::Safe),
            1 => Ok(RiskClass::FailureRisk),
            other => Err(format!("risk class must be 0 or 1, got {}", other)),
        }
    }
}

/// Result of scoring one record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Binary label under the decision threshold
    pub label: RiskClass,

    /// Probability of the failure class, in [0, 1]
    pub probability: f64,
}

impl PredictionResult {
    /// Derive the label from a probability. Label is failure iff
    /// `probability >= threshold`.
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        let label = if probability >= threshold {
            RiskClass::FailureRisk
        } else {
            RiskClass::Safe
        };
        Self { label, probability }
    }
}

/// Visual severity cue. Never feeds back into the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Elevated,
    High,
}

impl RiskLevel {
    pub fn classify(result: &PredictionResult, display_threshold: f64) -> Self {
        if result.probability >= display_threshold {
            RiskLevel::High
        } else if result.label.is_failure_risk() {
            RiskLevel::Elevated
        } else {
            RiskLevel::Low
        }
    }
}

/// Prediction as returned through the query interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub asset: AssetKind,
    #[serde(flatten)]
    pub result: PredictionResult,
    pub risk_level: RiskLevel,
    pub decision_threshold: f64,
    pub display_threshold: f64,
    pub model_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_follows_threshold() {
        let at = PredictionResult::from_probability(0.5, 0.5);
        assert_eq!(at.label, RiskClass::FailureRisk);

        let below = PredictionResult::from_probability(0.49, 0.5);
        assert_eq!(below.label, RiskClass::Safe);
    }

    #[test]
    fn test_probability_is_clamped() {
        assert_eq!(PredictionResult::from_probability(1.7, 0.5).probability, 1.0);
        assert_eq!(PredictionResult::from_probability(-0.2, 0.5).probability, 0.0);
        assert_eq!(PredictionResult::from_probability(f64::NAN, 0.5).probability, 0.0);
    }

    #[test]
    fn test_risk_class_serializes_as_integer() {
        let result = PredictionResult::from_probability(0.8, 0.5);
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["label"], 1);

        let parsed: PredictionResult =
            serde_json::from_str(r#"{"label":0,"probability":0.1}"#).unwrap();
        assert_eq!(parsed.label, RiskClass::Safe);
        assert!(serde_json::from_str::<PredictionResult>(r#"{"label":2,"probability":0.1}"#)
            .is_err());
    }

    #[test]
    fn test_display_level_is_independent_of_label() {
        let elevated = PredictionResult::from_probability(0.55, 0.5);
        assert_eq!(RiskLevel::classify(&elevated, 0.6), RiskLevel::Elevated);

        let high = PredictionResult::from_probability(0.6, 0.5);
        assert_eq!(RiskLevel::classify(&high, 0.6), RiskLevel::High);

        let low = PredictionResult::from_probability(0.2, 0.5);
        assert_eq!(RiskLevel::classify(&low, 0.6), RiskLevel::Low);
    }
}
