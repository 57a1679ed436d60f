use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::AssetKind;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// A required column is absent from a dataset or a query
    #[error("Missing field '{column}'{}", row_suffix(.row))]
    MissingField { column: String, row: Option<usize> },

    /// A categorical label outside the column's vocabulary
    #[error("Unknown category '{value}' for column '{column}'{}", row_suffix(.row))]
    UnknownCategory {
        column: String,
        value: String,
        row: Option<usize>,
    },

    /// Record shape disagrees with the trained feature schema
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Too few rows, or a single class, to fit a classifier
    #[error("Insufficient training data: {0}")]
    InsufficientData(String),

    /// Internal fit failure or malformed training input
    #[error("Training error: {0}")]
    Training(String),

    /// No trained model is installed for the asset
    #[error("No trained model available for asset '{0}'")]
    ModelUnavailable(AssetKind),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Dataset loading errors
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

fn row_suffix(row: &Option<usize>) -> String {
    match row {
        Some(row) => format!(" at row {}", row),
        None => String::new(),
    }
}

impl AppError {
    /// Errors caused by the shape or content of a record rather than by the system
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            AppError::MissingField { .. }
                | AppError::UnknownCategory { .. }
                | AppError::SchemaMismatch(_)
        )
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingField { .. } => StatusCode::BAD_REQUEST,
            AppError::UnknownCategory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::SchemaMismatch(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientData(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Training(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Dataset(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::MissingField { .. } => "MISSING_FIELD",
            AppError::UnknownCategory { .. } => "UNKNOWN_CATEGORY",
            AppError::SchemaMismatch(_) => "SCHEMA_MISMATCH",
            AppError::InsufficientData(_) => "INSUFFICIENT_DATA",
            AppError::Training(_) => "TRAINING_ERROR",
            AppError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Dataset(_) => "DATASET_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(
                error_code = error_code,
                status_code = status.as_u16(),
                message = %message,
                "Request error"
            );
        } else {
            tracing::warn!(
                error_code = error_code,
                status_code = status.as_u16(),
                message = %message,
                "Rejected request"
            );
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from csv::Error
impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Dataset(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
