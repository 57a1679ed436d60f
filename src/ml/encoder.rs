use crate::error::{AppError, Result};
use crate::ml::vocabulary::{ColumnKind, ColumnSpec, DatasetSchema, EncodingMap, FeatureSchema};
use crate::models::{RawDataset, RawRecord, RawValue};
use ndarray::Array2;
use tracing::{debug, instrument};

/// Numeric training input produced by [`encode`]
#[derive(Debug, Clone)]
pub struct EncodedDataset {
    /// Feature matrix (n_samples × n_features), columns in `feature_schema` order
    pub features: Array2<f64>,

    /// Binary failure labels, parallel to the feature rows
    pub labels: Vec<u8>,

    pub feature_schema: FeatureSchema,

    pub encoding_map: EncodingMap,
}

impl EncodedDataset {
    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }
}

/// Which role each dataset header plays once resolved against the schema
#[derive(Debug, Clone, Copy, PartialEq)]
enum HeaderRole {
    Feature(usize),
    Label,
    Excluded,
}

/// Turns raw records into feature vectors. The single enforcement point for
/// the schema: the same encoder instance serves training and inference.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    schema: DatasetSchema,
    feature_schema: FeatureSchema,
    encoding_map: EncodingMap,
}

impl FeatureEncoder {
    pub fn new(schema: DatasetSchema) -> Self {
        let feature_schema = schema.feature_schema();
        let encoding_map = schema.encoding_map();
        Self {
            schema,
            feature_schema,
            encoding_map,
        }
    }

    pub fn schema(&self) -> &DatasetSchema {
        &self.schema
    }

    pub fn feature_schema(&self) -> &FeatureSchema {
        &self.feature_schema
    }

    pub fn encoding_map(&self) -> &EncodingMap {
        &self.encoding_map
    }

    /// Encode a full labeled dataset
    #[instrument(skip(self, dataset), fields(asset = %self.schema.asset, rows = dataset.len()))]
    pub fn encode(&self, dataset: &RawDataset) -> Result<EncodedDataset> {
        if dataset.is_empty() {
            return Err(AppError::InsufficientData(format!(
                "{} dataset has no rows",
                self.schema.asset
            )));
        }

        let roles = self.resolve_headers(&dataset.columns)?;
        let n_features = self.feature_schema.len();
        let mut values = Vec::with_capacity(dataset.len() * n_features);
        let mut labels = Vec::with_capacity(dataset.len());

        for (row, record) in dataset.rows.iter().enumerate() {
            values.extend(self.encode_row(record, Some(row))?);
            labels.push(self.encode_label(record, row)?);
        }

        let features = Array2::from_shape_vec((dataset.len(), n_features), values)
            .map_err(|e| AppError::Internal(format!("Failed to build feature matrix: {}", e)))?;

        debug!(
            excluded = roles.iter().filter(|r| **r == HeaderRole::Excluded).count(),
            "Encoded dataset"
        );

        Ok(EncodedDataset {
            features,
            labels,
            feature_schema: self.feature_schema.clone(),
            encoding_map: self.encoding_map.clone(),
        })
    }

    /// Encode one unlabeled query into a vector in feature-schema order.
    /// Excluded columns are ignored; a label or unknown column is rejected.
    pub fn encode_record(&self, record: &RawRecord) -> Result<Vec<f64>> {
        let mut unexpected = Vec::new();
        let mut seen = vec![false; self.feature_schema.len()];

        for column in record.columns() {
            let header = column.trim();
            if let Some(index) = self.schema.feature_index(header) {
                if seen[index] {
                    return Err(AppError::SchemaMismatch(format!(
                        "column '{}' supplied more than once",
                        self.schema.features[index].name
                    )));
                }
                seen[index] = true;
            } else if self.schema.is_label(header) {
                return Err(AppError::SchemaMismatch(format!(
                    "label column '{}' must not be supplied in a query",
                    header
                )));
            } else if !self.schema.is_excluded(header) {
                unexpected.push(header.to_string());
            }
        }

        if !unexpected.is_empty() {
            return Err(AppError::SchemaMismatch(format!(
                "unknown columns for {} schema: {}",
                self.schema.asset,
                unexpected.join(", ")
            )));
        }

        self.encode_row(record, None)
    }

    /// Map every header to its role, failing on anything the schema does not
    /// account for
    fn resolve_headers(&self, headers: &[String]) -> Result<Vec<HeaderRole>> {
        let mut roles = Vec::with_capacity(headers.len());
        let mut feature_seen = vec![false; self.feature_schema.len()];
        let mut label_seen = false;
        let mut unexpected = Vec::new();

        for header in headers {
            let header = header.trim();
            if let Some(index) = self.schema.feature_index(header) {
                if feature_seen[index] {
                    return Err(AppError::SchemaMismatch(format!(
                        "more than one header resolves to column '{}'",
                        self.schema.features[index].name
                    )));
                }
                feature_seen[index] = true;
                roles.push(HeaderRole::Feature(index));
            } else if self.schema.is_label(header) {
                if label_seen {
                    return Err(AppError::SchemaMismatch(format!(
                        "more than one header resolves to label column '{}'",
                        self.schema.label_column
                    )));
                }
                label_seen = true;
                roles.push(HeaderRole::Label);
            } else if self.schema.is_excluded(header) {
                roles.push(HeaderRole::Excluded);
            } else {
                unexpected.push(header.to_string());
            }
        }

        if !unexpected.is_empty() {
            return Err(AppError::SchemaMismatch(format!(
                "unknown columns for {} schema: {} (add them to datasets.{}.exclude if they are identifiers)",
                self.schema.asset,
                unexpected.join(", "),
                self.schema.asset
            )));
        }

        if let Some(index) = feature_seen.iter().position(|seen| !seen) {
            return Err(AppError::MissingField {
                column: self.schema.features[index].name.clone(),
                row: None,
            });
        }

        if !label_seen {
            return Err(AppError::MissingField {
                column: self.schema.label_column.clone(),
                row: None,
            });
        }

        Ok(roles)
    }

    fn lookup<'a>(&self, record: &'a RawRecord, spec: &ColumnSpec) -> Option<&'a RawValue> {
        record
            .iter()
            .find(|(name, _)| spec.matches(name.trim()))
            .map(|(_, value)| value)
    }

    fn encode_row(&self, record: &RawRecord, row: Option<usize>) -> Result<Vec<f64>> {
        self.schema
            .features
            .iter()
            .map(|spec| {
                let value = self.lookup(record, spec).unwrap_or(&RawValue::Missing);
                encode_value(spec, value, row)
            })
            .collect()
    }

    fn encode_label(&self, record: &RawRecord, row: usize) -> Result<u8> {
        let value = record
            .iter()
            .find(|(name, _)| self.schema.is_label(name.trim()))
            .map(|(_, value)| value)
            .unwrap_or(&RawValue::Missing);

        if value.is_missing() {
            return Err(AppError::MissingField {
                column: self.schema.label_column.clone(),
                row: Some(row),
            });
        }

        let label = match value {
            RawValue::Bool(b) => Some(u8::from(*b)),
            RawValue::Number(n) if *n == 0.0 => Some(0),
            RawValue::Number(n) if *n == 1.0 => Some(1),
            RawValue::Text(s) if s.trim() == "0" => Some(0),
            RawValue::Text(s) if s.trim() == "1" => Some(1),
            _ => None,
        };

        label.ok_or_else(|| {
            AppError::Training(format!(
                "label column '{}' must be binary (0 or 1), found '{}' at row {}",
                self.schema.label_column, value, row
            ))
        })
    }
}

fn encode_value(spec: &ColumnSpec, value: &RawValue, row: Option<usize>) -> Result<f64> {
    if value.is_missing() {
        return Err(AppError::MissingField {
            column: spec.name.clone(),
            row,
        });
    }

    match &spec.kind {
        ColumnKind::Numeric => {
            let number = match value {
                RawValue::Number(n) => *n,
                RawValue::Bool(b) => f64::from(u8::from(*b)),
                other => {
                    return Err(AppError::SchemaMismatch(format!(
                        "column '{}' expects a number, got '{}'{}",
                        spec.name,
                        other,
                        row.map(|r| format!(" at row {}", r)).unwrap_or_default()
                    )))
                }
            };
            if !number.is_finite() {
                return Err(AppError::SchemaMismatch(format!(
                    "column '{}' must be finite, got {}",
                    spec.name, number
                )));
            }
            Ok(number)
        }
        ColumnKind::Categorical { vocabulary } => {
            let label = match value {
                RawValue::Text(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            vocabulary
                .code_of(&label)
                .map(|code| code as f64)
                .ok_or(AppError::UnknownCategory {
                    column: spec.name.clone(),
                    value: label,
                    row,
                })
        }
    }
}

/// Encode a raw dataset under a schema. Pure function of its inputs.
pub fn encode(dataset: &RawDataset, schema: &DatasetSchema) -> Result<EncodedDataset> {
    FeatureEncoder::new(schema.clone()).encode(dataset)
}
