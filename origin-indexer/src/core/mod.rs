//! Core domain abstractions and types
//!
//! This module contains the foundational types, traits, and error definitions
//! shared by the pipeline and every adapter. It is independent of any
//! specific infrastructure concerns.

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use error::{IndexerError, IndexerResult};
pub use traits::{ChainPort, DeadLetterPort, MetadataPort, PersistencePort, WarehousePort};
pub use types::{sort_logs, BlockWindow, Checkpoint, LogPosition, RawBlock, RawLog, StreamId};
