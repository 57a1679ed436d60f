pub mod asset;
pub mod dataset;
pub mod prediction;
pub mod record;

pub use asset::*;
pub use dataset::*;
pub use prediction::*;
pub use record::*;
