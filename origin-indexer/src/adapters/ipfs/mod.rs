//! IPFS adapters

pub mod gateway;
pub mod mock;

pub use gateway::IpfsGateway;
pub use mock::MockMetadata;
