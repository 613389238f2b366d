//! Dshop product domain models

use serde::{Deserialize, Serialize};

/// Indexed product record - one row of the dshop table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductEvent {
    // Identity
    pub natural_key: String,
    pub contract_address: String,
    pub listing_id: String,
    pub product_id: String,

    // Product data
    pub ipfs_path: String,
    pub external_id: Option<String>,
    pub parent_external_id: Option<String>,
    pub title: String,
    pub description: String,
    /// Price in the currency's minor units
    pub price: i64,
    pub currency: String,
    pub option1: Option<String>,
    pub option2: Option<String>,
    pub option3: Option<String>,
    pub image: Option<String>,

    // Context
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u64,
}

impl ProductEvent {
    /// Variant options in order, skipping the unset ones
    pub fn options(&self) -> Vec<&str> {
        [&self.option1, &self.option2, &self.option3]
            .into_iter()
            .filter_map(|o| o.as_deref())
            .collect()
    }
}
