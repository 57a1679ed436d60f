use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Kind of monitored infrastructure asset. Each kind has its own dataset,
/// schema and trained model.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumString,
    Display,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AssetKind {
    Bridge,
    Water,
}

impl AssetKind {
    /// Human readable name used in log lines and reports
    pub fn description(&self) -> &'static str {
        match self {
            AssetKind::Bridge => "bridge",
            AssetKind::Water => "water pipeline",
        }
    }
}
