//! Adapters - implementations of the core ports

pub mod chain;
pub mod ipfs;
pub mod storage;
pub mod warehouse;

pub use chain::{JsonRpcChainClient, MockChain};
pub use ipfs::{IpfsGateway, MockMetadata};
pub use storage::{DeadLetterStore, MemoryStore, PostgresStore};
pub use warehouse::{BigQueryWarehouse, MockBehavior, MockWarehouse, TokenSource};
