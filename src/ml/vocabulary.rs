//! Declarative, versioned schema and vocabulary tables.
//!
//! Training and inference both read the encoding from here. Any change to a
//! vocabulary, a feature list or a feature order must bump [`SCHEMA_VERSION`].

use crate::error::{AppError, Result};
use crate::models::AssetKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Version of the built-in schema tables
pub const SCHEMA_VERSION: u32 = 1;

/// Finite set of valid labels for one categorical column, with their codes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    entries: Vec<(String, i64)>,
}

impl Vocabulary {
    /// Labels and codes must each be unique
    pub fn new<S: Into<String>>(entries: impl IntoIterator<Item = (S, i64)>) -> Result<Self> {
        let entries: Vec<(String, i64)> = entries
            .into_iter()
            .map(|(label, code)| (label.into(), code))
            .collect();

        if entries.is_empty() {
            return Err(AppError::Configuration(
                "vocabulary must contain at least one label".to_string(),
            ));
        }

        let mut labels = HashSet::new();
        let mut codes = HashSet::new();
        for (label, code) in &entries {
            if !labels.insert(label.as_str()) {
                return Err(AppError::Configuration(format!(
                    "duplicate vocabulary label '{}'",
                    label
                )));
            }
            if !codes.insert(*code) {
                return Err(AppError::Configuration(format!(
                    "duplicate vocabulary code {} (label '{}')",
                    code, label
                )));
            }
        }

        Ok(Self { entries })
    }

    pub fn code_of(&self, label: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(known, _)| known == label)
            .map(|(_, code)| *code)
    }

    pub fn entries(&self) -> &[(String, i64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How a feature column is turned into a number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical { vocabulary: Vocabulary },
}

/// One model input column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Canonical name, used in errors and in the feature schema
    pub name: String,

    /// Header spellings seen in source datasets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,

    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn numeric(name: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            kind: ColumnKind::Numeric,
        }
    }

    pub fn categorical(name: &str, aliases: &[&str], vocabulary: Vocabulary) -> Self {
        Self {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            kind: ColumnKind::Categorical { vocabulary },
        }
    }

    pub fn matches(&self, header: &str) -> bool {
        self.name == header || self.aliases.iter().any(|a| a == header)
    }
}

/// Ordered feature column names fixed at training time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// (column, label) -> code for every categorical column of one schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingMap {
    pub version: u32,
    pub vocabularies: BTreeMap<String, Vocabulary>,
}

impl EncodingMap {
    pub fn code_of(&self, column: &str, label: &str) -> Option<i64> {
        self.vocabularies
            .get(column)
            .and_then(|vocabulary| vocabulary.code_of(label))
    }
}

/// Everything the encoder needs to know about one dataset type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub asset: AssetKind,
    pub version: u32,
    pub label_column: String,
    pub label_aliases: Vec<String>,
    /// Identifier and tag columns dropped before encoding
    pub excluded: Vec<String>,
    pub features: Vec<ColumnSpec>,
}

impl DatasetSchema {
    /// Built-in schema for an asset kind
    pub fn for_asset(asset: AssetKind) -> Result<Self> {
        match asset {
            AssetKind::Bridge => Self::bridge(),
            AssetKind::Water => Self::water(),
        }
    }

    pub fn bridge() -> Result<Self> {
        Self {
            asset: AssetKind::Bridge,
            version: SCHEMA_VERSION,
            label_column: "failure".to_string(),
            label_aliases: vec!["Failure".to_string()],
            excluded: vec![
                "Bridge_ID".to_string(),
                "Location".to_string(),
                "asset_type".to_string(),
            ],
            features: vec![
                ColumnSpec::numeric("age", &["Age_of_Bridge"]),
                ColumnSpec::numeric("traffic", &["Traffic_Volume"]),
                ColumnSpec::categorical(
                    "material",
                    &["Material_Type"],
                    Vocabulary::new([("Concrete", 0), ("Steel", 1)])?,
                ),
                ColumnSpec::categorical(
                    "maintenance",
                    &["Maintenance_Level"],
                    Vocabulary::new([("No-Maintenance", 0), ("Bi-Annual", 1), ("Annual", 2)])?,
                ),
            ],
        }
        .validated()
    }

    pub fn water() -> Result<Self> {
        Self {
            asset: AssetKind::Water,
            version: SCHEMA_VERSION,
            label_column: "failure".to_string(),
            label_aliases: vec!["Failure".to_string()],
            excluded: vec![
                "Pipe_ID".to_string(),
                "Location".to_string(),
                "asset_type".to_string(),
            ],
            features: vec![
                ColumnSpec::numeric("pressure", &["Pressure (bar)"]),
                ColumnSpec::numeric("flow", &["Flow Rate (L/s)"]),
                ColumnSpec::numeric("temperature", &["Temperature (°C)"]),
                ColumnSpec::numeric("burst", &["Burst Status"]),
            ],
        }
        .validated()
    }

    /// Add operator-configured identifier columns to the excluded list
    pub fn with_excluded<S: AsRef<str>>(mut self, extra: &[S]) -> Result<Self> {
        for column in extra {
            let column = column.as_ref().trim().to_string();
            if !self.excluded.contains(&column) {
                self.excluded.push(column);
            }
        }
        self.validated()
    }

    /// Every header spelling must map to exactly one role
    fn validated(self) -> Result<Self> {
        let mut seen = HashSet::new();
        let names = self
            .features
            .iter()
            .flat_map(|f| std::iter::once(&f.name).chain(f.aliases.iter()))
            .chain(std::iter::once(&self.label_column))
            .chain(self.label_aliases.iter())
            .chain(self.excluded.iter());

        for name in names {
            if !seen.insert(name.as_str()) {
                return Err(AppError::Configuration(format!(
                    "column name '{}' is declared more than once in the {} schema",
                    name, self.asset
                )));
            }
        }

        if self.features.is_empty() {
            return Err(AppError::Configuration(format!(
                "{} schema declares no feature columns",
                self.asset
            )));
        }

        Ok(self)
    }

    pub fn is_label(&self, header: &str) -> bool {
        self.label_column == header || self.label_aliases.iter().any(|a| a == header)
    }

    pub fn is_excluded(&self, header: &str) -> bool {
        self.excluded.iter().any(|e| e == header)
    }

    pub fn feature_index(&self, header: &str) -> Option<usize> {
        self.features.iter().position(|f| f.matches(header))
    }

    pub fn feature_schema(&self) -> FeatureSchema {
        FeatureSchema::new(self.features.iter().map(|f| f.name.clone()).collect())
    }

    pub fn encoding_map(&self) -> EncodingMap {
        let vocabularies = self
            .features
            .iter()
            .filter_map(|f| match &f.kind {
                ColumnKind::Categorical { vocabulary } => {
                    Some((f.name.clone(), vocabulary.clone()))
                }
                ColumnKind::Numeric => None,
            })
            .collect();

        EncodingMap {
            version: self.version,
            vocabularies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_vocabulary_codes() {
        let schema = DatasetSchema::bridge().unwrap();
        let map = schema.encoding_map();

        assert_eq!(map.version, SCHEMA_VERSION);
        assert_eq!(map.code_of("material", "Concrete"), Some(0));
        assert_eq!(map.code_of("material", "Steel"), Some(1));
        assert_eq!(map.code_of("maintenance", "No-Maintenance"), Some(0));
        assert_eq!(map.code_of("maintenance", "Bi-Annual"), Some(1));
        assert_eq!(map.code_of("maintenance", "Annual"), Some(2));
        assert_eq!(map.code_of("material", "Wood"), None);
        assert_eq!(map.code_of("age", "Concrete"), None);
    }

    #[test]
    fn test_feature_schema_order() {
        let bridge = DatasetSchema::bridge().unwrap().feature_schema();
        assert_eq!(
            bridge.columns(),
            &["age", "traffic", "material", "maintenance"]
        );

        let water = DatasetSchema::water().unwrap().feature_schema();
        assert_eq!(
            water.columns(),
            &["pressure", "flow", "temperature", "burst"]
        );
        assert!(DatasetSchema::water().unwrap().encoding_map().vocabularies.is_empty());
    }

    #[test]
    fn test_vocabulary_rejects_duplicates() {
        assert!(Vocabulary::new([("Concrete", 0), ("Concrete", 1)]).is_err());
        assert!(Vocabulary::new([("Concrete", 0), ("Steel", 0)]).is_err());
        assert!(Vocabulary::new(Vec::<(String, i64)>::new()).is_err());
    }

    #[test]
    fn test_aliases_resolve_to_features() {
        let schema = DatasetSchema::water().unwrap();
        assert_eq!(schema.feature_index("Flow Rate (L/s)"), Some(1));
        assert_eq!(schema.feature_index("flow"), Some(1));
        assert!(schema.is_label("failure"));
        assert!(schema.is_excluded("Pipe_ID"));
    }

    #[test]
    fn test_extra_exclusions_cannot_shadow_features() {
        let schema = DatasetSchema::bridge().unwrap();
        assert!(schema.clone().with_excluded(&["Inspector"]).unwrap().is_excluded("Inspector"));
        assert!(schema.with_excluded(&["Age_of_Bridge"]).is_err());
    }
}
