use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::metrics::gather_metrics;
use crate::ml::{DatasetSchema, EncodingMap, FeatureSchema, ModelMetadata, ModelSummary, ServiceStats};
use crate::models::{AssetKind, RawRecord, RiskAssessment};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, info};

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Ready once every configured asset has a model
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let stats = state.service.stats();
    let ready = state.service.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "not_ready" }.to_string(),
            models: stats.models.iter().map(|m| m.asset).collect(),
            missing: stats.missing,
        }),
    )
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub models: Vec<AssetKind>,
    pub missing: Vec<AssetKind>,
}

/// Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

/// Overview of every served model
pub async fn list_models(State(state): State<AppState>) -> Result<Json<ServiceStats>> {
    Ok(Json(state.service.stats()))
}

/// Metadata and encoding tables of one served model
pub async fn get_model(
    State(state): State<AppState>,
    Path(asset): Path<String>,
) -> Result<Json<ModelDetails>> {
    let asset = parse_asset(&asset)?;
    let model = state.service.model(asset)?;

    Ok(Json(ModelDetails {
        metadata: model.metadata().clone(),
        feature_schema: model.feature_schema().clone(),
        encoding_map: model.encoding_map().clone(),
        schema: model.encoder().schema().clone(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ModelDetails {
    pub metadata: ModelMetadata,
    pub feature_schema: FeatureSchema,
    pub encoding_map: EncodingMap,
    pub schema: DatasetSchema,
}

/// Reload the configured dataset and swap in a freshly trained model
pub async fn retrain_model(
    State(state): State<AppState>,
    Path(asset): Path<String>,
) -> Result<Json<ModelSummary>> {
    let asset = parse_asset(&asset)?;
    info!(asset = %asset, "Retrain requested");

    let service = state.service.clone();
    let model = tokio::task::spawn_blocking(move || service.retrain(asset))
        .await
        .map_err(|e| AppError::Internal(format!("retrain task failed: {}", e)))??;

    Ok(Json(ModelSummary::from(model.metadata())))
}

/// Score one query. The body is a JSON object of raw feature values keyed
/// by column name, e.g. `{"age": 50, "material": "Concrete", ...}`.
pub async fn predict(
    State(state): State<AppState>,
    Path(asset): Path<String>,
    payload: std::result::Result<Json<RawRecord>, JsonRejection>,
) -> Result<Json<RiskAssessment>> {
    let asset = parse_asset(&asset)?;
    let Json(query) =
        payload.map_err(|e| AppError::Validation(format!("invalid query body: {}", e.body_text())))?;

    debug!(asset = %asset, fields = query.len(), "Scoring query");
    let assessment = state.service.assess(asset, &query)?;
    Ok(Json(assessment))
}

fn parse_asset(raw: &str) -> Result<AssetKind> {
    AssetKind::from_str(raw).map_err(|_| AppError::NotFound(format!("Unknown asset type '{}'", raw)))
}
