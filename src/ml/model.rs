use crate::error::{AppError, Result};
use crate::ml::classifier::{Classifier, ModelType};
use crate::ml::encoder::FeatureEncoder;
use crate::ml::metrics::ModelMetrics;
use crate::ml::vocabulary::{EncodingMap, FeatureSchema};
use crate::models::{AssetKind, RawRecord};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Unique id of this fitted instance
    pub model_id: Uuid,

    pub asset: AssetKind,

    /// Version of the schema tables the model was encoded with
    pub schema_version: u32,

    /// Model type
    pub model_type: ModelType,

    /// Training timestamp
    pub trained_at: DateTime<Utc>,

    /// Number of training samples
    pub n_training_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// Rows per class, `[safe, failure]`
    pub class_counts: [usize; 2],

    /// Resubstitution metrics on the full training set
    pub training_metrics: ModelMetrics,

    /// Holdout metrics, when a validation split was taken
    pub validation_metrics: Option<ModelMetrics>,

    /// Hyperparameters
    pub hyperparameters: HashMap<String, String>,
}

/// A fitted classifier bound to the feature schema and encoding it was
/// trained with. Immutable once built; refreshes produce a new instance.
pub struct TrainedModel {
    encoder: FeatureEncoder,
    classifier: Box<dyn Classifier>,
    metadata: ModelMetadata,
}

impl TrainedModel {
    pub(crate) fn new(
        encoder: FeatureEncoder,
        classifier: Box<dyn Classifier>,
        metadata: ModelMetadata,
    ) -> Result<Self> {
        if classifier.n_features() != encoder.feature_schema().len() {
            return Err(AppError::Training(format!(
                "classifier was fitted on {} features but the schema has {}",
                classifier.n_features(),
                encoder.feature_schema().len()
            )));
        }
        Ok(Self {
            encoder,
            classifier,
            metadata,
        })
    }

    pub fn asset(&self) -> AssetKind {
        self.metadata.asset
    }

    pub fn id(&self) -> Uuid {
        self.metadata.model_id
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn feature_schema(&self) -> &FeatureSchema {
        self.encoder.feature_schema()
    }

    pub fn encoding_map(&self) -> &EncodingMap {
        self.encoder.encoding_map()
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    /// Encode a query with this model's encoding, in this model's column order
    pub fn encode_query(&self, query: &RawRecord) -> Result<Vec<f64>> {
        self.encoder.encode_record(query)
    }

    /// Failure probability for one already-encoded feature vector
    pub fn probability(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.feature_schema().len() {
            return Err(AppError::SchemaMismatch(format!(
                "expected {} features ({}), got {}",
                self.feature_schema().len(),
                self.feature_schema().columns().join(", "),
                features.len()
            )));
        }

        let row = Array2::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| AppError::Internal(format!("Failed to create feature array: {}", e)))?;

        let proba = self.classifier.predict_proba(&row)?;
        proba
            .first()
            .copied()
            .ok_or_else(|| AppError::Internal("classifier returned no probability".to_string()))
    }
}

impl fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedModel")
            .field("model_id", &self.metadata.model_id)
            .field("asset", &self.metadata.asset)
            .field("model_type", &self.metadata.model_type)
            .field("feature_schema", self.feature_schema())
            .finish()
    }
}
