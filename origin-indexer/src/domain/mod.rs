//! Domain layer - models and log processors

pub mod models;
pub mod processors;

pub use models::*;
pub use processors::{EventExtractor, ExtractionReport};
