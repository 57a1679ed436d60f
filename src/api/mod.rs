pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::ml::RiskService;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RiskService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<RiskService>) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }
}
