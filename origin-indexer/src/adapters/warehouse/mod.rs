//! Warehouse adapters

pub mod auth;
pub mod bigquery;
pub mod mock;

pub use auth::TokenSource;
pub use bigquery::{BigQueryWarehouse, TableRef};
pub use mock::{MockBehavior, MockWarehouse};
