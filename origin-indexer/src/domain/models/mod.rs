//! Domain models for the indexer

pub mod dead_letter;
pub mod listing;
pub mod product;

pub use dead_letter::DeadLetter;
pub use listing::{ListingEvent, ListingEventKind, ListingMetadata};
pub use product::ProductEvent;

use crate::core::{BlockWindow, StreamId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Warehouse columns of the marketplace table, in schema order
pub const MARKETPLACE_COLUMNS: &[&str] = &[
    "block_number",
    "log_index",
    "listing_id",
    "ipfs_hash",
    "listing_type",
    "category",
    "subcategory",
    "language",
    "title",
    "description",
    "price",
    "currency",
    "natural_key",
    "written_at",
];

/// Warehouse columns of the dshop table, in schema order
pub const DSHOP_COLUMNS: &[&str] = &[
    "block_number",
    "log_index",
    "listing_id",
    "product_id",
    "ipfs_path",
    "external_id",
    "parent_external_id",
    "title",
    "description",
    "price",
    "currency",
    "option1",
    "option2",
    "option3",
    "image",
    "natural_key",
    "written_at",
];

/// Normalized, warehouse-shaped record derived from one log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DomainRecord {
    Listing(ListingEvent),
    Product(ProductEvent),
}

impl DomainRecord {
    /// Key used for idempotent upsert, locally and in the warehouse
    pub fn natural_key(&self) -> &str {
        match self {
            DomainRecord::Listing(l) => &l.natural_key,
            DomainRecord::Product(p) => &p.natural_key,
        }
    }

    /// Block height the record was extracted from
    pub fn source_height(&self) -> u64 {
        match self {
            DomainRecord::Listing(l) => l.block_number,
            DomainRecord::Product(p) => p.block_number,
        }
    }

    pub fn log_index(&self) -> u64 {
        match self {
            DomainRecord::Listing(l) => l.log_index,
            DomainRecord::Product(p) => p.log_index,
        }
    }

    pub fn stream(&self) -> StreamId {
        match self {
            DomainRecord::Listing(_) => StreamId::Marketplace,
            DomainRecord::Product(_) => StreamId::Dshop,
        }
    }

    /// Warehouse row in the destination table's column layout, stamped with
    /// the write time so downstream dedup can pick the latest version of a
    /// natural key.
    pub fn to_row(&self, written_at: DateTime<Utc>) -> Value {
        // Fixed-width timestamp keeps row sizes independent of the clock
        let written_at = written_at.to_rfc3339_opts(SecondsFormat::Micros, true);
        match self {
            DomainRecord::Listing(l) => json!({
                "block_number": l.block_number,
                "log_index": l.log_index,
                "listing_id": l.listing_id,
                "ipfs_hash": l.ipfs_hash,
                "listing_type": l.metadata.listing_type,
                "category": l.metadata.category,
                "subcategory": l.metadata.subcategory,
                "language": l.metadata.language,
                "title": l.metadata.title,
                "description": l.metadata.description,
                "price": l.metadata.price_value(),
                "currency": l.metadata.currency,
                "natural_key": l.natural_key,
                "written_at": written_at,
            }),
            DomainRecord::Product(p) => json!({
                "block_number": p.block_number,
                "log_index": p.log_index,
                "listing_id": p.listing_id,
                "product_id": p.product_id,
                "ipfs_path": p.ipfs_path,
                "external_id": p.external_id,
                "parent_external_id": p.parent_external_id,
                "title": p.title,
                "description": p.description,
                "price": p.price,
                "currency": p.currency,
                "option1": p.option1,
                "option2": p.option2,
                "option3": p.option3,
                "image": p.image,
                "natural_key": p.natural_key,
                "written_at": written_at,
            }),
        }
    }

    /// One element of an `insertAll` request: the row wrapped with its
    /// dedup id.
    pub fn insert_row(&self, written_at: DateTime<Utc>) -> Value {
        json!({
            "insertId": self.natural_key(),
            "json": self.to_row(written_at),
        })
    }

    /// Bytes this record adds to an `insertAll` request body, including
    /// the envelope and the separating comma.
    pub fn row_size(&self) -> usize {
        serde_json::to_vec(&self.insert_row(Utc::now()))
            .map(|v| v.len() + 1)
            .unwrap_or(0)
    }
}

/// Records on their way to the warehouse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBatch {
    pub stream_id: StreamId,
    /// Block range the records were committed with
    pub window: BlockWindow,
    /// Position of the batch within its cycle
    pub batch_seq: u32,
    pub records: Vec<DomainRecord>,
    pub attempt_count: u32,
}

impl ExportBatch {
    pub fn new(stream_id: StreamId, window: BlockWindow, batch_seq: u32, records: Vec<DomainRecord>) -> Self {
        Self {
            stream_id,
            window,
            batch_seq,
            records,
            attempt_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> ListingEvent {
        ListingEvent {
            natural_key: "0xmarket:ListingCreated:42:0xtx:3".to_string(),
            contract_address: "0xmarket".to_string(),
            event_name: ListingEventKind::Created,
            listing_id: "42".to_string(),
            party: "0xseller".to_string(),
            ipfs_hash: "QmTest".to_string(),
            metadata: ListingMetadata {
                title: Some("Vintage jacket".to_string()),
                price: Some("0.25".to_string()),
                currency: Some("token-ETH".to_string()),
                ..Default::default()
            },
            block_number: 101,
            tx_hash: "0xtx".to_string(),
            log_index: 3,
        }
    }

    #[test]
    fn test_listing_row_shape() {
        let record = DomainRecord::Listing(listing());
        let written_at = Utc::now();
        let row = record.to_row(written_at);

        assert_eq!(row["listing_id"], "42");
        assert_eq!(row["block_number"], 101);
        assert_eq!(row["title"], "Vintage jacket");
        assert_eq!(row["price"], 0.25);
        assert!(row["category"].is_null());
        assert_eq!(row["natural_key"], record.natural_key());
        assert_eq!(
            row["written_at"],
            written_at.to_rfc3339_opts(SecondsFormat::Micros, true)
        );

        let columns: Vec<&str> = row.as_object().unwrap().keys().map(String::as_str).collect();
        let mut expected = MARKETPLACE_COLUMNS.to_vec();
        expected.sort_unstable();
        let mut actual = columns;
        actual.sort_unstable();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_row_size_covers_insert_envelope() {
        let record = DomainRecord::Listing(listing());
        let envelope = serde_json::to_vec(&record.insert_row(Utc::now())).unwrap();

        assert_eq!(record.row_size(), envelope.len() + 1);
        assert!(record.row_size() > serde_json::to_vec(&record.to_row(Utc::now())).unwrap().len());
    }

    #[test]
    fn test_record_accessors() {
        let record = DomainRecord::Listing(listing());
        assert_eq!(record.source_height(), 101);
        assert_eq!(record.stream(), StreamId::Marketplace);
        assert!(record.row_size() > 0);
    }
}
