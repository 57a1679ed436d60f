/// Failure-risk classification for infrastructure assets
///
/// This module covers the whole path from a raw tabular dataset to a served
/// prediction:
/// - Declarative per-asset schemas and categorical vocabularies
/// - Feature encoding for training tables and single queries
/// - Random-forest and decision-tree training with holdout metrics
/// - Thresholded scoring and the model registry behind the API

pub mod classifier;
pub mod encoder;
pub mod metrics;
pub mod model;
pub mod predictor;
pub mod service;
pub mod trainer;
pub mod vocabulary;

pub use classifier::{
    Classifier, DecisionTreeModel, ForestParams, MaxFeatures, ModelType, RandomForest, TreeParams,
};
pub use encoder::{encode, EncodedDataset, FeatureEncoder};
pub use metrics::{ClassMetrics, ModelMetrics};
pub use model::{ModelMetadata, TrainedModel};
pub use predictor::{predict, PredictionConfig, Predictor};
pub use service::{DatasetSource, ModelSummary, RiskService, ServiceStats};
pub use trainer::{train, ModelTrainer, TrainingParams};
pub use vocabulary::{
    ColumnKind, ColumnSpec, DatasetSchema, EncodingMap, FeatureSchema, Vocabulary, SCHEMA_VERSION,
};
