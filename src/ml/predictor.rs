use crate::error::{AppError, Result};
use crate::ml::model::TrainedModel;
use crate::models::{PredictionResult, RawRecord, RiskAssessment, RiskLevel};
use serde::{Deserialize, Serialize};
use tracing::trace;
use validator::Validate;

/// Scoring and display thresholds. The two are independent: the display
/// threshold only picks a severity cue and never changes the label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct PredictionConfig {
    /// Probability at or above which the label is failure risk
    #[serde(default = "default_decision_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub decision_threshold: f64,

    /// Probability at or above which a result is shown as high risk
    #[serde(default = "default_display_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub display_threshold: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            decision_threshold: default_decision_threshold(),
            display_threshold: default_display_threshold(),
        }
    }
}

impl PredictionConfig {
    /// Both thresholds must be finite probabilities
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| AppError::Configuration(format!("invalid prediction thresholds: {}", e)))?;
        for (name, value) in [
            ("decision_threshold", self.decision_threshold),
            ("display_threshold", self.display_threshold),
        ] {
            if !value.is_finite() {
                return Err(AppError::Configuration(format!(
                    "invalid prediction thresholds: {} is {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

fn default_decision_threshold() -> f64 {
    0.5
}

fn default_display_threshold() -> f64 {
    0.6
}

/// Scores raw queries against a trained model
#[derive(Debug, Clone, Copy)]
pub struct Predictor {
    config: PredictionConfig,
}

impl Predictor {
    pub fn new(config: PredictionConfig) -> Result<Self> {
        config.check()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// Encode `query` with the model's own encoding and score it
    pub fn predict(&self, model: &TrainedModel, query: &RawRecord) -> Result<PredictionResult> {
        let features = model.encode_query(query)?;
        let probability = model.probability(&features)?;
        let result = PredictionResult::from_probability(probability, self.config.decision_threshold);

        trace!(
            asset = %model.asset(),
            model_id = %model.id(),
            probability = result.probability,
            label = result.label.as_u8(),
            "Scored query"
        );

        Ok(result)
    }

    /// Prediction plus the display cue, as served to callers
    pub fn assess(&self, model: &TrainedModel, query: &RawRecord) -> Result<RiskAssessment> {
        let result = self.predict(model, query)?;
        Ok(RiskAssessment {
            asset: model.asset(),
            result,
            risk_level: RiskLevel::classify(&result, self.config.display_threshold),
            decision_threshold: self.config.decision_threshold,
            display_threshold: self.config.display_threshold,
            model_id: model.id(),
        })
    }
}

impl Default for Predictor {
    fn default() -> Self {
        Self {
            config: PredictionConfig::default(),
        }
    }
}

/// Score one query under the default 0.5 decision threshold
pub fn predict(model: &TrainedModel, query: &RawRecord) -> Result<PredictionResult> {
    Predictor::default().predict(model, query)
}
