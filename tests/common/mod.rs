//! Shared fixtures for integration tests

#![allow(dead_code)]

use infra_early_warning::{
    ml::{
        DatasetSource, ForestParams, MaxFeatures, ModelTrainer, PredictionConfig, Predictor,
        RiskService, TrainingParams, TreeParams,
    },
    models::AssetKind,
};
use std::collections::HashMap;
use std::path::PathBuf;

pub fn data_path(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join(file)
}

/// Small seeded forest so tests are fast and repeatable
pub fn test_params() -> TrainingParams {
    TrainingParams {
        forest: ForestParams {
            n_trees: 25,
            max_features: MaxFeatures::Sqrt,
            seed: Some(42),
            tree: TreeParams::default(),
        },
        ..TrainingParams::default()
    }
}

/// Service wired to the bundled datasets, not yet trained
pub fn untrained_service() -> RiskService {
    let predictor = Predictor::new(PredictionConfig::default()).expect("default thresholds");
    RiskService::new(ModelTrainer::new(test_params()), predictor)
        .with_source(
            AssetKind::Bridge,
            DatasetSource {
                path: data_path("bridge.csv"),
                exclude: vec![],
            },
        )
        .with_source(
            AssetKind::Water,
            DatasetSource {
                path: data_path("water.csv"),
                exclude: vec![],
            },
        )
}

pub fn trained_service() -> RiskService {
    let service = untrained_service();
    service.train_all().expect("bundled datasets train");
    service
}

/// Parse Prometheus exposition format into metric name -> lines
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines() {
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 3 {
                current_metric = parts[2].to_string();
                metrics
                    .entry(current_metric.clone())
                    .or_insert_with(Vec::new)
                    .push(line.to_string());
            }
        } else if !line.starts_with('#') && !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}
