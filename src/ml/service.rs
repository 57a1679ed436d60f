use crate::config::{Config, DatasetConfig};
use crate::error::{AppError, Result};
use crate::metrics::{
    MODEL_GENERATION, PREDICTIONS_TOTAL, PREDICTION_ERRORS_TOTAL, TRAINING_DURATION_SECONDS,
    TRAINING_ROWS,
};
use crate::ml::encoder::FeatureEncoder;
use crate::ml::model::{ModelMetadata, TrainedModel};
use crate::ml::predictor::Predictor;
use crate::ml::trainer::ModelTrainer;
use crate::ml::vocabulary::DatasetSchema;
use crate::models::{AssetKind, PredictionResult, RawDataset, RawRecord, RiskAssessment};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Serves one trained model per asset type and refreshes them on demand.
///
/// Readers clone the current `Arc<TrainedModel>` under a short read lock and
/// score outside it, so a refresh never blocks or disturbs in-flight
/// predictions. A failed refresh leaves the previous model in place.
pub struct RiskService {
    trainer: ModelTrainer,
    predictor: Predictor,
    sources: HashMap<AssetKind, DatasetSource>,
    models: RwLock<HashMap<AssetKind, Arc<TrainedModel>>>,
}

/// Training table location for one asset
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSource {
    pub path: PathBuf,
    pub exclude: Vec<String>,
}

impl From<&DatasetConfig> for DatasetSource {
    fn from(config: &DatasetConfig) -> Self {
        Self {
            path: config.path.clone(),
            exclude: config.exclude.clone(),
        }
    }
}

impl RiskService {
    pub fn new(trainer: ModelTrainer, predictor: Predictor) -> Self {
        Self {
            trainer,
            predictor,
            sources: HashMap::new(),
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Build the service from application configuration. No model is
    /// trained until [`RiskService::train_all`] or [`RiskService::retrain`].
    pub fn from_config(config: &Config) -> Result<Self> {
        let predictor = Predictor::new(config.prediction)?;
        let trainer = ModelTrainer::new(config.training.to_params());

        let service = config
            .datasets
            .enabled()
            .fold(Self::new(trainer, predictor), |service, (asset, dataset)| {
                service.with_source(asset, DatasetSource::from(dataset))
            });

        Ok(service)
    }

    /// Register the CSV a retrain of `asset` reads from
    pub fn with_source(mut self, asset: AssetKind, source: DatasetSource) -> Self {
        self.sources.insert(asset, source);
        self
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// Assets with a configured training source, in a stable order
    pub fn configured_assets(&self) -> Vec<AssetKind> {
        let mut assets: Vec<AssetKind> = self.sources.keys().copied().collect();
        assets.sort();
        assets
    }

    /// Built-in schema for `asset` plus any configured extra exclusions
    pub fn schema_for(&self, asset: AssetKind) -> Result<DatasetSchema> {
        let schema = DatasetSchema::for_asset(asset)?;
        match self.sources.get(&asset) {
            Some(source) if !source.exclude.is_empty() => schema.with_excluded(&source.exclude),
            _ => Ok(schema),
        }
    }

    /// Encode and fit `dataset`, then make the result the served model for
    /// `asset`. On error the previous model, if any, stays in service.
    pub fn install_dataset(&self, asset: AssetKind, dataset: &RawDataset) -> Result<Arc<TrainedModel>> {
        let start = Instant::now();
        let fitted = self
            .schema_for(asset)
            .map(FeatureEncoder::new)
            .and_then(|encoder| self.trainer.fit_raw(&encoder, dataset));
        let elapsed = start.elapsed().as_secs_f64();

        let model = match fitted {
            Ok(model) => {
                TRAINING_DURATION_SECONDS
                    .with_label_values(&[asset.as_ref(), "success"])
                    .observe(elapsed);
                Arc::new(model)
            }
            Err(e) => {
                TRAINING_DURATION_SECONDS
                    .with_label_values(&[asset.as_ref(), "failure"])
                    .observe(elapsed);
                error!(asset = %asset, error = %e, "Training failed; keeping current model");
                return Err(e);
            }
        };

        let previous = self.models.write().insert(asset, model.clone());

        TRAINING_ROWS
            .with_label_values(&[asset.as_ref()])
            .set(model.metadata().n_training_samples as f64);
        MODEL_GENERATION.with_label_values(&[asset.as_ref()]).inc();

        info!(
            asset = %asset,
            model_id = %model.id(),
            replaced = ?previous.map(|m| m.id()),
            rows = model.metadata().n_training_samples,
            elapsed_secs = elapsed,
            "Installed model"
        );

        Ok(model)
    }

    /// Reload the configured CSV for `asset` and install a fresh model
    pub fn retrain(&self, asset: AssetKind) -> Result<Arc<TrainedModel>> {
        let source = self.sources.get(&asset).ok_or_else(|| {
            AppError::Configuration(format!("no training dataset configured for {}", asset))
        })?;

        info!(asset = %asset, path = %source.path.display(), "Retraining model");
        let dataset = RawDataset::from_path(&source.path)?;
        self.install_dataset(asset, &dataset)
    }

    /// Train every configured asset. Stops at the first failure.
    pub fn train_all(&self) -> Result<()> {
        for asset in self.configured_assets() {
            self.retrain(asset)?;
        }
        Ok(())
    }

    /// Currently served model for `asset`
    pub fn model(&self, asset: AssetKind) -> Result<Arc<TrainedModel>> {
        self.models
            .read()
            .get(&asset)
            .cloned()
            .ok_or(AppError::ModelUnavailable(asset))
    }

    pub fn predict(&self, asset: AssetKind, query: &RawRecord) -> Result<PredictionResult> {
        let outcome = self
            .model(asset)
            .and_then(|model| self.predictor.predict(&model, query));
        record_outcome(asset, outcome.as_ref().map(|r| r.label.as_u8()));
        outcome
    }

    pub fn assess(&self, asset: AssetKind, query: &RawRecord) -> Result<RiskAssessment> {
        let outcome = self
            .model(asset)
            .and_then(|model| self.predictor.assess(&model, query));
        record_outcome(asset, outcome.as_ref().map(|a| a.result.label.as_u8()));
        outcome
    }

    /// True once every configured asset has a model
    pub fn is_ready(&self) -> bool {
        let models = self.models.read();
        !models.is_empty() && self.sources.keys().all(|asset| models.contains_key(asset))
    }

    pub fn stats(&self) -> ServiceStats {
        let models = self.models.read();
        let mut summaries: Vec<ModelSummary> = models
            .values()
            .map(|model| ModelSummary::from(model.metadata()))
            .collect();
        summaries.sort_by_key(|s| s.asset);

        let mut missing: Vec<AssetKind> = self
            .sources
            .keys()
            .filter(|asset| !models.contains_key(asset))
            .copied()
            .collect();
        missing.sort();

        ServiceStats {
            decision_threshold: self.predictor.config().decision_threshold,
            display_threshold: self.predictor.config().display_threshold,
            models: summaries,
            missing,
        }
    }
}

fn record_outcome(asset: AssetKind, outcome: std::result::Result<u8, &AppError>) {
    match outcome {
        Ok(label) => {
            PREDICTIONS_TOTAL
                .with_label_values(&[asset.as_ref(), &label.to_string()])
                .inc();
        }
        Err(e) => {
            if e.is_schema_error() {
                warn!(asset = %asset, error = %e, "Rejected query");
            }
            PREDICTION_ERRORS_TOTAL
                .with_label_values(&[asset.as_ref(), e.error_code()])
                .inc();
        }
    }
}

/// Registry overview
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub decision_threshold: f64,
    pub display_threshold: f64,
    pub models: Vec<ModelSummary>,

    /// Configured assets that have no model yet
    pub missing: Vec<AssetKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub asset: AssetKind,
    pub model_id: Uuid,
    pub model_type: String,
    pub trained_at: DateTime<Utc>,
    pub n_training_samples: usize,
    pub class_counts: [usize; 2],
    pub training_accuracy: f64,
    pub validation_accuracy: Option<f64>,
}

impl From<&ModelMetadata> for ModelSummary {
    fn from(metadata: &ModelMetadata) -> Self {
        Self {
            asset: metadata.asset,
            model_id: metadata.model_id,
            model_type: metadata.model_type.to_string(),
            trained_at: metadata.trained_at,
            n_training_samples: metadata.n_training_samples,
            class_counts: metadata.class_counts,
            training_accuracy: metadata.training_metrics.accuracy,
            validation_accuracy: metadata.validation_metrics.as_ref().map(|m| m.accuracy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::classifier::{ForestParams, MaxFeatures, TreeParams};
    use crate::ml::predictor::PredictionConfig;
    use crate::ml::trainer::TrainingParams;
    use crate::models::RawValue;
    use std::io::Write;

    fn water_dataset(rows: usize) -> RawDataset {
        let rows = (0..rows).map(|i| {
            let pressure = 2.0 + (i % 10) as f64;
            let burst = i % 3 == 0;
            let failure = pressure >= 8.0 || (burst && pressure >= 6.0);
            vec![
                RawValue::from(format!("P-{:03}", i)),
                RawValue::from(pressure),
                RawValue::from(40.0 + (i * 7 % 60) as f64),
                RawValue::from(10.0 + (i % 20) as f64),
                RawValue::from(if burst { 1.0 } else { 0.0 }),
                RawValue::from(if failure { 1.0 } else { 0.0 }),
            ]
        });
        RawDataset::from_rows(
            &[
                "Pipe_ID",
                "Pressure (bar)",
                "Flow Rate (L/s)",
                "Temperature (°C)",
                "Burst Status",
                "failure",
            ],
            rows,
        )
        .unwrap()
    }

    fn service() -> RiskService {
        let trainer = ModelTrainer::new(TrainingParams {
            forest: ForestParams {
                n_trees: 20,
                max_features: MaxFeatures::All,
                seed: Some(5),
                tree: TreeParams::default(),
            },
            ..TrainingParams::default()
        });
        RiskService::new(trainer, Predictor::new(PredictionConfig::default()).unwrap())
    }

    fn water_query() -> RawRecord {
        RawRecord::new()
            .with("pressure", 8.0)
            .with("flow", 80.0)
            .with("temperature", 25.0)
            .with("burst", 1.0)
    }

    #[test]
    fn test_predict_without_model_is_unavailable() {
        let service = service();
        let err = service.predict(AssetKind::Water, &water_query()).unwrap_err();
        assert!(matches!(err, AppError::ModelUnavailable(AssetKind::Water)));
    }

    #[test]
    fn test_install_then_predict() {
        let service = service();
        let model = service
            .install_dataset(AssetKind::Water, &water_dataset(40))
            .unwrap();

        let query = water_query();
        let result = service.predict(AssetKind::Water, &query).unwrap();
        assert!((0.0..=1.0).contains(&result.probability));

        let assessment = service.assess(AssetKind::Water, &query).unwrap();
        assert_eq!(assessment.model_id, model.id());
        assert_eq!(assessment.asset, AssetKind::Water);
    }

    #[test]
    fn test_label_column_in_query_is_rejected() {
        let service = service();
        service
            .install_dataset(AssetKind::Water, &water_dataset(40))
            .unwrap();

        let err = service
            .predict(AssetKind::Water, &water_query().with("failure", 1.0))
            .unwrap_err();
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_failed_retrain_keeps_previous_model() {
        let service = service();
        let first = service
            .install_dataset(AssetKind::Water, &water_dataset(40))
            .unwrap();

        let single_class = RawDataset::from_rows(
            &["pressure", "flow", "temperature", "burst", "failure"],
            (0..10).map(|i| vec![i as f64, 50.0, 20.0, 0.0, 0.0]),
        )
        .unwrap();
        assert!(service
            .install_dataset(AssetKind::Water, &single_class)
            .is_err());

        assert_eq!(service.model(AssetKind::Water).unwrap().id(), first.id());
    }

    #[test]
    fn test_refresh_does_not_disturb_held_model() {
        let service = service();
        let held = service
            .install_dataset(AssetKind::Water, &water_dataset(40))
            .unwrap();
        let replacement = service
            .install_dataset(AssetKind::Water, &water_dataset(60))
            .unwrap();

        assert_ne!(held.id(), replacement.id());
        assert_eq!(held.metadata().n_training_samples, 40);
        assert_eq!(service.model(AssetKind::Water).unwrap().id(), replacement.id());
    }

    #[test]
    fn test_retrain_from_configured_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "Pipe_ID,Location,Pressure (bar),Flow Rate (L/s),Temperature (°C),Burst Status,failure"
        )
        .unwrap();
        for i in 0..30 {
            let pressure = 2 + i % 10;
            writeln!(
                file,
                "P{},Zone {},{},{},{},{},{}",
                i,
                i % 4,
                pressure,
                50 + i,
                15 + i % 9,
                i % 2,
                u8::from(pressure >= 8)
            )
            .unwrap();
        }

        let service = service().with_source(
            AssetKind::Water,
            DatasetSource {
                path: file.path().to_path_buf(),
                exclude: vec![],
            },
        );
        assert!(!service.is_ready());

        service.train_all().unwrap();
        assert!(service.is_ready());

        let stats = service.stats();
        assert_eq!(stats.models.len(), 1);
        assert_eq!(stats.models[0].n_training_samples, 30);
        assert!(stats.missing.is_empty());
    }

    #[test]
    fn test_retrain_without_source_is_configuration_error() {
        let err = service().retrain(AssetKind::Bridge).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_configured_exclusions_apply() {
        let service = service().with_source(
            AssetKind::Water,
            DatasetSource {
                path: PathBuf::from("unused.csv"),
                exclude: vec!["Inspector".to_string()],
            },
        );
        let schema = service.schema_for(AssetKind::Water).unwrap();
        assert!(schema.is_excluded("Inspector"));
        assert!(schema.is_excluded("Pipe_ID"));
    }
}
