//! Marketplace listing domain models

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Listing lifecycle event emitted by the marketplace contract
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ListingEventKind {
    #[serde(rename = "ListingCreated")]
    Created,
    #[serde(rename = "ListingUpdated")]
    Updated,
    #[serde(rename = "ListingWithdrawn")]
    Withdrawn,
}

impl ListingEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingEventKind::Created => "ListingCreated",
            ListingEventKind::Updated => "ListingUpdated",
            ListingEventKind::Withdrawn => "ListingWithdrawn",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ListingCreated" => Some(ListingEventKind::Created),
            "ListingUpdated" => Some(ListingEventKind::Updated),
            "ListingWithdrawn" => Some(ListingEventKind::Withdrawn),
            _ => None,
        }
    }
}

impl fmt::Display for ListingEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indexed listing event - one row of the marketplace table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingEvent {
    // Identity
    pub natural_key: String,
    pub contract_address: String,
    pub event_name: ListingEventKind,

    // Listing details
    pub listing_id: String,
    pub party: String,
    /// CIDv0 rendering of the on-chain bytes32 hash
    pub ipfs_hash: String,

    /// Fields resolved from the IPFS listing document, empty when not fetched
    #[serde(default)]
    pub metadata: ListingMetadata,

    // Context
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u64,
}

impl ListingEvent {
    /// Withdrawals carry no new listing document
    pub fn has_document(&self) -> bool {
        self.event_name != ListingEventKind::Withdrawn
    }
}

/// Descriptive listing fields published on IPFS
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingMetadata {
    pub listing_type: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub language: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Decimal amount as published, e.g. "0.25"
    pub price: Option<String>,
    pub currency: Option<String>,
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl ListingMetadata {
    /// Read the fields of an Origin listing document.
    ///
    /// Older documents carry `price.currency` as a plain symbol, newer ones
    /// as an object with an `id` such as `token-ETH` or `fiat-USD`.
    pub fn from_document(document: &Value) -> Self {
        let price = document.get("price");
        let currency = price.and_then(|p| p.get("currency")).and_then(|c| match c {
            Value::Object(map) => text(map.get("id")),
            other => text(Some(other)),
        });

        Self {
            listing_type: text(document.get("listingType")),
            category: text(document.get("category")),
            subcategory: text(document.get("subCategory")),
            language: text(document.get("language")),
            title: text(document.get("title")),
            description: text(document.get("description")),
            price: text(price.and_then(|p| p.get("amount"))),
            currency,
        }
    }

    /// Price as the warehouse's FLOAT64 column
    pub fn price_value(&self) -> Option<f64> {
        self.price.as_deref()?.parse::<f64>().ok().filter(|p| p.is_finite())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
