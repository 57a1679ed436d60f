use crate::error::{AppError, Result};
use crate::models::{RawRecord, RawValue};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// An in-memory tabular dataset: ordered headers plus rows of raw values.
/// Header names are kept exactly as the source spells them; the encoder
/// normalizes them.
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    pub columns: Vec<String>,
    pub rows: Vec<RawRecord>,
}

impl RawDataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a dataset from headers and rows of cells in header order
    pub fn from_rows<I, R, V>(columns: &[&str], rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = V>,
        V: Into<RawValue>,
    {
        let mut dataset = RawDataset::new(columns.iter().map(|c| c.to_string()).collect());
        for (index, row) in rows.into_iter().enumerate() {
            let values: Vec<RawValue> = row.into_iter().map(Into::into).collect();
            if values.len() != columns.len() {
                return Err(AppError::Dataset(format!(
                    "row {} has {} values, expected {}",
                    index,
                    values.len(),
                    columns.len()
                )));
            }
            dataset.rows.push(
                columns
                    .iter()
                    .zip(values)
                    .map(|(name, value)| (name.to_string(), value))
                    .collect(),
            );
        }
        Ok(dataset)
    }

    /// Load a headed CSV file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            AppError::Dataset(format!("failed to open {}: {}", path.display(), e))
        })?;

        let dataset = Self::from_reader(file)
            .map_err(|e| AppError::Dataset(format!("{}: {}", path.display(), e)))?;

        debug!(
            path = %path.display(),
            rows = dataset.len(),
            columns = dataset.columns.len(),
            "Loaded dataset"
        );
        Ok(dataset)
    }

    /// Read a headed CSV from any reader. Ragged rows are rejected.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut dataset = RawDataset::new(columns);

        for record in reader.records() {
            let record = record?;
            let row: RawRecord = dataset
                .columns
                .iter()
                .zip(record.iter())
                .map(|(name, cell)| (name.clone(), RawValue::parse(cell)))
                .collect();
            dataset.rows.push(row);
        }

        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
