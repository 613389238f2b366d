//! Dshop product log decoder

use super::events::ProductPublished;
use super::{malformed, natural_key, LogDecoder};
use crate::core::{IndexerResult, RawLog};
use crate::domain::models::{DomainRecord, ProductEvent};
use alloy_primitives::B256;
use alloy_sol_types::SolEvent;

const EVENT_NAME: &str = "ProductPublished";

/// Empty strings on-chain mean "not set"
fn optional(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

pub struct ProductDecoder;

impl LogDecoder for ProductDecoder {
    fn event_name(&self) -> &'static str {
        EVENT_NAME
    }

    fn signature(&self) -> B256 {
        ProductPublished::SIGNATURE_HASH
    }

    fn decode(&self, log: &RawLog) -> IndexerResult<Option<DomainRecord>> {
        let event = ProductPublished::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| malformed(log, EVENT_NAME, e))?;

        let price = i64::try_from(event.price)
            .map_err(|_| malformed(log, EVENT_NAME, format!("price {} out of range", event.price)))?;

        if event.title.is_empty() {
            return Err(malformed(log, EVENT_NAME, "missing title"));
        }

        let listing_id = event.listingID.to_string();
        let product_id = event.productID.to_string();
        let natural_key = natural_key(log, EVENT_NAME, &[listing_id.clone(), product_id.clone()]);

        Ok(Some(DomainRecord::Product(ProductEvent {
            natural_key,
            contract_address: log.contract_address.to_string(),
            listing_id,
            product_id,
            ipfs_path: event.ipfsPath,
            external_id: optional(event.externalId),
            parent_external_id: optional(event.parentExternalId),
            title: event.title,
            description: event.description,
            price,
            currency: event.currency,
            option1: optional(event.option1),
            option2: optional(event.option2),
            option3: optional(event.option3),
            image: optional(event.image),
            block_number: log.block_height,
            tx_hash: log.tx_hash.to_string(),
            log_index: log.log_index,
        })))
    }
}
