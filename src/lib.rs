//! Early-warning failure-risk classification for bridges and water pipelines.
//!
//! A model per asset type is trained from a tabular dataset at startup and
//! served over HTTP. See [`ml::RiskService`] for the registry and
//! [`api::build_router`] for the query surface.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ml;
pub mod models;

pub use error::{AppError, Result};
