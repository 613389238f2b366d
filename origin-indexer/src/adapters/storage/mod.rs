//! Storage adapters
//!
//! PostgreSQL holds checkpoints and records, RocksDB holds the dead-letter
//! queue, and an in-memory store stands in for Postgres in tests.

pub mod dead_letter;
pub mod memory;
pub mod postgres;

pub use dead_letter::{ColumnFamilies, DeadLetterStore};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
