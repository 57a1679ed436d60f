use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use infra_early_warning::{
    config::Config,
    ml::{DatasetSchema, FeatureEncoder, ModelTrainer},
    models::{AssetKind, RawDataset, RawRecord, RawValue},
};
use reqwest::Client;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "iew-cli")]
#[command(about = "Infrastructure Early Warning CLI", long_about = None)]
struct Cli {
    #[arg(short, long, env = "IEW_ENDPOINT", default_value = "http://localhost:8080")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one asset
    Predict {
        #[arg(value_name = "ASSET")]
        asset: AssetKind,

        /// Feature value as column=value; repeat for each column
        #[arg(short, long = "field", value_name = "COLUMN=VALUE", value_parser = parse_field)]
        fields: Vec<(String, RawValue)>,
    },

    /// List served models
    Models,

    /// Show one model's metadata and encoding tables
    Model {
        #[arg(value_name = "ASSET")]
        asset: AssetKind,
    },

    /// Retrain a model from its configured dataset
    Retrain {
        #[arg(value_name = "ASSET")]
        asset: AssetKind,
    },

    /// Check server health
    Health,

    /// Train on a local CSV and print the model report, without a server
    Evaluate {
        #[arg(value_name = "ASSET")]
        asset: AssetKind,

        /// Dataset path; defaults to the configured one
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Fix the training seed
        #[arg(short, long)]
        seed: Option<u64>,
    },
}

fn parse_field(raw: &str) -> Result<(String, RawValue), String> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=VALUE, got '{}'", raw))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("empty column name in '{}'", raw));
    }
    Ok((column.to_string(), RawValue::parse(value)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Predict { asset, fields } => {
            if fields.is_empty() {
                bail!("no --field given");
            }
            let query: RawRecord = fields.into_iter().collect();

            let response = client
                .post(format!("{}/v1/predict/{}", cli.endpoint, asset))
                .json(&query)
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Models => {
            let response = client
                .get(format!("{}/v1/models", cli.endpoint))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Model { asset } => {
            let response = client
                .get(format!("{}/v1/models/{}", cli.endpoint, asset))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Retrain { asset } => {
            let response = client
                .post(format!("{}/v1/models/{}/retrain", cli.endpoint, asset))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.endpoint))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Evaluate { asset, data, seed } => {
            let config = Config::load().context("Failed to load configuration")?;
            let configured = config.datasets.get(asset);

            let path = match (data, configured) {
                (Some(path), _) => path,
                (None, Some(dataset)) => dataset.path.clone(),
                (None, None) => bail!("no dataset configured for {}; pass --data", asset),
            };
            let exclude = configured.map(|d| d.exclude.clone()).unwrap_or_default();

            let mut params = config.training.to_params();
            if seed.is_some() {
                params.forest.seed = seed;
            }

            let schema = DatasetSchema::for_asset(asset)?.with_excluded(&exclude)?;
            let encoder = FeatureEncoder::new(schema);
            let dataset = RawDataset::from_path(&path)?;
            let model = ModelTrainer::new(params).fit_raw(&encoder, &dataset)?;

            println!("{}", serde_json::to_string_pretty(model.metadata())?);
        }
    }

    Ok(())
}
