//! Services layer

pub mod enricher;
pub mod publisher;

pub use enricher::{EnrichmentReport, ListingEnricher};
pub use publisher::{BatchPlanner, PublishReport, PublishResult, Publisher, ReplayReport};
