use crate::error::{AppError, Result};
use crate::ml::classifier::{ForestParams, MaxFeatures, ModelType, TreeParams};
use crate::ml::predictor::PredictionConfig;
use crate::ml::trainer::TrainingParams;
use crate::models::AssetKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Training data per asset type
    #[serde(default)]
    pub datasets: DatasetsConfig,

    /// Scoring thresholds
    #[serde(default)]
    #[validate(nested)]
    pub prediction: PredictionConfig,

    /// Classifier hyperparameters
    #[serde(default)]
    #[validate(nested)]
    pub training: TrainingConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file at
    /// `$CONFIG_PATH` and `IEW__SECTION__KEY` environment variables
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: IEW__)
            .add_source(environment())
            .build()?
            .try_deserialize()?;

        config.checked()
    }

    /// Parse a TOML document layered over the embedded defaults
    pub fn from_toml(overrides: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from_str(overrides, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.checked()
    }

    fn checked(self) -> Result<Self> {
        self.validate()
            .map_err(|e| AppError::Configuration(format!("invalid configuration: {}", e)))?;
        self.prediction.check()?;
        Ok(self)
    }
}

/// `IEW__SECTION__KEY` variables; exclude lists are comma separated
fn environment() -> config::Environment {
    config::Environment::with_prefix("IEW")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("datasets.bridge.exclude")
        .with_list_parse_key("datasets.water.exclude")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            datasets: DatasetsConfig::default(),
            prediction: PredictionConfig::default(),
            training: TrainingConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    #[validate(range(min = 1))]
    pub http_port: u16,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    #[validate(range(min = 1, max = 3600))]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Where an asset's training table lives and which extra columns to ignore
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetConfig {
    /// Set to false to serve no model for this asset
    #[serde(default = "default_true")]
    pub enabled: bool,

    pub path: PathBuf,

    /// Identifier or metadata columns dropped before encoding, on top of the
    /// built-in ones
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetsConfig {
    pub bridge: Option<DatasetConfig>,
    pub water: Option<DatasetConfig>,
}

impl DatasetsConfig {
    pub fn get(&self, asset: AssetKind) -> Option<&DatasetConfig> {
        let dataset = match asset {
            AssetKind::Bridge => self.bridge.as_ref(),
            AssetKind::Water => self.water.as_ref(),
        };
        dataset.filter(|d| d.enabled)
    }

    /// Enabled datasets in asset order
    pub fn enabled(&self) -> impl Iterator<Item = (AssetKind, &DatasetConfig)> {
        [AssetKind::Bridge, AssetKind::Water]
            .into_iter()
            .filter_map(move |asset| self.get(asset).map(|d| (asset, d)))
    }
}

/// Flat view of the classifier hyperparameters, as written in config files
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrainingConfig {
    #[serde(default)]
    pub model_type: ModelType,

    #[serde(default = "default_n_trees")]
    #[validate(range(min = 1, max = 10000))]
    pub n_trees: usize,

    #[serde(default)]
    pub max_features: MaxFeatures,

    #[serde(default)]
    pub max_depth: Option<u16>,

    #[serde(default = "default_min_samples_split")]
    #[validate(range(min = 2))]
    pub min_samples_split: usize,

    #[serde(default = "default_min_samples_leaf")]
    #[validate(range(min = 1))]
    pub min_samples_leaf: usize,

    /// Fixed seed for reproducible fits
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default = "default_validation_fraction")]
    #[validate(range(min = 0.0, max = 0.5))]
    pub validation_fraction: f64,
}

impl TrainingConfig {
    pub fn to_params(&self) -> TrainingParams {
        TrainingParams {
            model_type: self.model_type,
            forest: ForestParams {
                n_trees: self.n_trees,
                max_features: self.max_features,
                seed: self.seed,
                tree: TreeParams {
                    max_depth: self.max_depth,
                    min_samples_split: self.min_samples_split,
                    min_samples_leaf: self.min_samples_leaf,
                },
            },
            validation_fraction: self.validation_fraction,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_type: ModelType::default(),
            n_trees: default_n_trees(),
            max_features: MaxFeatures::default(),
            max_depth: None,
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            seed: None,
            validation_fraction: default_validation_fraction(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: true,
            service_name: default_service_name(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_n_trees() -> usize {
    100
}

fn default_min_samples_split() -> usize {
    2
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_validation_fraction() -> f64 {
    0.2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "infra-early-warning".to_string()
}
