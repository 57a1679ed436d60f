use crate::error::{AppError, Result};
use crate::ml::classifier::{Classifier, DecisionTreeModel, ForestParams, ModelType, RandomForest};
use crate::ml::encoder::{EncodedDataset, FeatureEncoder};
use crate::ml::metrics::ModelMetrics;
use crate::ml::model::{ModelMetadata, TrainedModel};
use crate::models::RawDataset;
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Everything that shapes a fit
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingParams {
    pub model_type: ModelType,
    pub forest: ForestParams,

    /// Share of each class held out for validation metrics; 0 disables
    pub validation_fraction: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            model_type: ModelType::RandomForest,
            forest: ForestParams::default(),
            validation_fraction: 0.2,
        }
    }
}

/// Fits classifiers on encoded datasets
#[derive(Debug, Clone, Default)]
pub struct ModelTrainer {
    params: TrainingParams,
}

impl ModelTrainer {
    pub fn new(params: TrainingParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    /// Encode a raw dataset and fit a model on it
    pub fn fit_raw(&self, encoder: &FeatureEncoder, dataset: &RawDataset) -> Result<TrainedModel> {
        let encoded = encoder.encode(dataset)?;
        self.train(encoder, &encoded)
    }

    /// Fit a model on a dataset produced by `encoder`
    #[instrument(skip_all, fields(asset = %encoder.schema().asset, rows = dataset.n_samples()))]
    pub fn train(&self, encoder: &FeatureEncoder, dataset: &EncodedDataset) -> Result<TrainedModel> {
        if dataset.feature_schema != *encoder.feature_schema()
            || dataset.encoding_map != *encoder.encoding_map()
        {
            return Err(AppError::Training(
                "dataset was encoded with a different schema than the model encoder".to_string(),
            ));
        }

        let class_counts = validate_training_input(
            &dataset.features,
            &dataset.labels,
            encoder.feature_schema().len(),
        )?;

        let started = Instant::now();
        let validation_metrics = self.holdout_metrics(&dataset.features, &dataset.labels)?;

        let classifier = self.fit_classifier(&dataset.features, &dataset.labels)?;
        let predictions = classifier.predict(&dataset.features, 0.5)?;
        let training_metrics = ModelMetrics::calculate(&dataset.labels, &predictions);

        let mut hyperparameters = match self.params.model_type {
            ModelType::RandomForest => self.params.forest.describe(),
            ModelType::DecisionTree => self.params.forest.tree.describe(),
        };
        hyperparameters.insert(
            "validation_fraction".to_string(),
            self.params.validation_fraction.to_string(),
        );

        let metadata = ModelMetadata {
            model_id: Uuid::new_v4(),
            asset: encoder.schema().asset,
            schema_version: dataset.encoding_map.version,
            model_type: self.params.model_type,
            trained_at: chrono::Utc::now(),
            n_training_samples: dataset.n_samples(),
            n_features: dataset.n_features(),
            class_counts,
            training_metrics,
            validation_metrics,
            hyperparameters,
        };

        info!(
            model_id = %metadata.model_id,
            model_type = %metadata.model_type,
            safe = class_counts[0],
            failure = class_counts[1],
            training_accuracy = metadata.training_metrics.accuracy,
            validation_accuracy = ?metadata.validation_metrics.as_ref().map(|m| m.accuracy),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Trained model"
        );

        TrainedModel::new(encoder.clone(), classifier, metadata)
    }

    fn fit_classifier(&self, features: &Array2<f64>, labels: &[u8]) -> Result<Box<dyn Classifier>> {
        Ok(match self.params.model_type {
            ModelType::RandomForest => {
                Box::new(RandomForest::fit(features, labels, &self.params.forest)?)
            }
            ModelType::DecisionTree => {
                Box::new(DecisionTreeModel::fit(features, labels, &self.params.forest.tree)?)
            }
        })
    }

    /// Stratified holdout. Skipped when a class is too small to leave a row
    /// on both sides of the split.
    fn holdout_metrics(&self, features: &Array2<f64>, labels: &[u8]) -> Result<Option<ModelMetrics>> {
        let fraction = self.params.validation_fraction;
        if fraction <= 0.0 {
            return Ok(None);
        }

        let mut rng = match self.params.forest.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };

        let mut train_rows = Vec::new();
        let mut test_rows = Vec::new();
        for class in 0..=1u8 {
            let mut rows: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, y)| **y == class)
                .map(|(i, _)| i)
                .collect();
            let n_test = (rows.len() as f64 * fraction).floor() as usize;
            if n_test == 0 || n_test >= rows.len() {
                debug!(class, rows = rows.len(), "Class too small for a holdout split");
                return Ok(None);
            }
            rows.shuffle(&mut rng);
            test_rows.extend_from_slice(&rows[..n_test]);
            train_rows.extend_from_slice(&rows[n_test..]);
        }

        let train_labels: Vec<u8> = train_rows.iter().map(|&i| labels[i]).collect();
        let test_labels: Vec<u8> = test_rows.iter().map(|&i| labels[i]).collect();

        let classifier = self.fit_classifier(&features.select(Axis(0), &train_rows), &train_labels)?;
        let predictions = classifier.predict(&features.select(Axis(0), &test_rows), 0.5)?;

        Ok(Some(ModelMetrics::calculate(&test_labels, &predictions)))
    }
}

/// Check shape, content and class balance before fitting. Returns the
/// per-class row counts.
fn validate_training_input(
    features: &Array2<f64>,
    labels: &[u8],
    n_schema_features: usize,
) -> Result<[usize; 2]> {
    if features.nrows() != labels.len() {
        return Err(AppError::Training(format!(
            "feature matrix has {} rows but {} labels were given",
            features.nrows(),
            labels.len()
        )));
    }

    if features.ncols() != n_schema_features {
        return Err(AppError::Training(format!(
            "feature matrix has {} columns but the schema has {}",
            features.ncols(),
            n_schema_features
        )));
    }

    if let Some(((row, col), value)) = features.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(AppError::Training(format!(
            "non-numeric feature value {} at row {}, column {}",
            value, row, col
        )));
    }

    if labels.len() < 2 {
        return Err(AppError::InsufficientData(format!(
            "at least 2 rows are required, got {}",
            labels.len()
        )));
    }

    let mut counts = [0usize; 2];
    for &label in labels {
        match label {
            0 | 1 => counts[usize::from(label)] += 1,
            other => {
                return Err(AppError::Training(format!(
                    "labels must be 0 or 1, found {}",
                    other
                )))
            }
        }
    }

    if counts[0] == 0 || counts[1] == 0 {
        return Err(AppError::InsufficientData(format!(
            "both classes must be present (safe: {}, failure: {})",
            counts[0], counts[1]
        )));
    }

    Ok(counts)
}

/// Fit a model on an encoded matrix. The encoder must be the one that built
/// `dataset`; it becomes part of the model.
pub fn train(
    dataset: &EncodedDataset,
    encoder: &FeatureEncoder,
    params: &TrainingParams,
) -> Result<TrainedModel> {
    ModelTrainer::new(params.clone()).train(encoder, dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::classifier::{MaxFeatures, TreeParams};
    use crate::ml::vocabulary::DatasetSchema;
    use crate::models::{AssetKind, RawValue};

    fn water_encoder() -> FeatureEncoder {
        FeatureEncoder::new(DatasetSchema::water().unwrap())
    }

    fn water_dataset(n: usize) -> RawDataset {
        let rows = (0..n).map(|i| {
            let pressure = 2.0 + (i % 15) as f64;
            let failure = if pressure > 9.0 { 1.0 } else { 0.0 };
            vec![
                RawValue::from(pressure),
                RawValue::from(20.0 + (i * 7 % 150) as f64),
                RawValue::from((i % 40) as f64),
                RawValue::from((i % 2) as f64),
                RawValue::from(failure),
            ]
        });
        RawDataset::from_rows(&["pressure", "flow", "temperature", "burst", "failure"], rows)
            .unwrap()
    }

    fn params() -> TrainingParams {
        TrainingParams {
            model_type: ModelType::RandomForest,
            forest: ForestParams {
                n_trees: 20,
                max_features: MaxFeatures::All,
                seed: Some(11),
                tree: TreeParams::default(),
            },
            validation_fraction: 0.25,
        }
    }

    #[test]
    fn test_train_builds_bound_model() {
        let encoder = water_encoder();
        let encoded = encoder.encode(&water_dataset(60)).unwrap();
        let model = train(&encoded, &encoder, &params()).unwrap();

        let meta = model.metadata();
        assert_eq!(meta.asset, AssetKind::Water);
        assert_eq!(meta.n_training_samples, 60);
        assert_eq!(meta.n_features, 4);
        assert_eq!(meta.class_counts[0] + meta.class_counts[1], 60);
        assert!(meta.training_metrics.accuracy > 0.9);
        assert!(meta.validation_metrics.is_some());
        assert_eq!(model.feature_schema(), encoder.feature_schema());
        assert_eq!(meta.hyperparameters["n_trees"], "20");
    }

    #[test]
    fn test_single_class_is_insufficient() {
        let encoder = water_encoder();
        let mut encoded = encoder.encode(&water_dataset(20)).unwrap();
        encoded.labels = vec![0; 20];

        assert!(matches!(
            train(&encoded, &encoder, &params()),
            Err(AppError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_single_row_is_insufficient() {
        let encoder = water_encoder();
        let mut encoded = encoder.encode(&water_dataset(1)).unwrap();
        encoded.labels = vec![1];

        assert!(matches!(
            train(&encoded, &encoder, &params()),
            Err(AppError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_row_count_mismatch_is_training_error() {
        let encoder = water_encoder();
        let mut encoded = encoder.encode(&water_dataset(20)).unwrap();
        encoded.labels.pop();

        assert!(matches!(
            train(&encoded, &encoder, &params()),
            Err(AppError::Training(_))
        ));
    }

    #[test]
    fn test_non_finite_feature_is_training_error() {
        let encoder = water_encoder();
        let mut encoded = encoder.encode(&water_dataset(20)).unwrap();
        encoded.features[[3, 1]] = f64::NAN;

        let err = train(&encoded, &encoder, &params()).unwrap_err();
        assert!(matches!(err, AppError::Training(_)));
        assert!(err.to_string().contains("row 3"));
    }

    #[test]
    fn test_encoder_must_match_dataset() {
        let water = water_encoder();
        let encoded = water.encode(&water_dataset(20)).unwrap();
        let bridge = FeatureEncoder::new(DatasetSchema::bridge().unwrap());

        assert!(matches!(
            train(&encoded, &bridge, &params()),
            Err(AppError::Training(_))
        ));
    }

    #[test]
    fn test_validation_skipped_for_tiny_classes() {
        let encoder = water_encoder();
        let dataset = RawDataset::from_rows(
            &["pressure", "flow", "temperature", "burst", "failure"],
            vec![
                vec![2.0, 40.0, 10.0, 0.0, 0.0],
                vec![3.0, 50.0, 12.0, 0.0, 0.0],
                vec![14.0, 150.0, 30.0, 1.0, 1.0],
                vec![15.0, 160.0, 35.0, 1.0, 1.0],
            ],
        )
        .unwrap();

        let model = ModelTrainer::new(params()).fit_raw(&encoder, &dataset).unwrap();
        assert!(model.metadata().validation_metrics.is_none());
        assert_eq!(model.metadata().class_counts, [2, 2]);
    }

    #[test]
    fn test_decision_tree_model_type() {
        let encoder = water_encoder();
        let trainer = ModelTrainer::new(TrainingParams {
            model_type: ModelType::DecisionTree,
            validation_fraction: 0.0,
            ..params()
        });

        let model = trainer.fit_raw(&encoder, &water_dataset(30)).unwrap();
        assert_eq!(model.metadata().model_type, ModelType::DecisionTree);
        assert!(model.metadata().validation_metrics.is_none());
        assert!(!model.metadata().hyperparameters.contains_key("n_trees"));
    }
}
