//! Marketplace listing log decoder

use super::events::{ListingCreated, ListingUpdated, ListingWithdrawn, OfferCreated};
use super::{malformed, natural_key, LogDecoder};
use crate::core::{IndexerResult, RawLog};
use crate::domain::models::{DomainRecord, ListingEvent, ListingEventKind, ListingMetadata};
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolEvent;

/// Multihash prefix of a sha2-256 digest (CIDv0)
const IPFS_SHA256_PREFIX: [u8; 2] = [0x12, 0x20];

/// Render the bytes32 stored on-chain as a base58 CIDv0 (`Qm...`)
pub fn ipfs_hash_from_bytes32(hash: &B256) -> String {
    let mut multihash = Vec::with_capacity(34);
    multihash.extend_from_slice(&IPFS_SHA256_PREFIX);
    multihash.extend_from_slice(hash.as_slice());
    bs58::encode(multihash).into_string()
}

/// Decoder for one of the listing lifecycle events
pub struct ListingDecoder {
    kind: ListingEventKind,
}

impl ListingDecoder {
    pub fn new(kind: ListingEventKind) -> Self {
        Self { kind }
    }

    /// Decoders for every listing event
    pub fn all() -> Vec<Self> {
        vec![
            Self::new(ListingEventKind::Created),
            Self::new(ListingEventKind::Updated),
            Self::new(ListingEventKind::Withdrawn),
        ]
    }

    fn decode_parts(&self, log: &RawLog) -> Result<(Address, U256, B256), alloy_sol_types::Error> {
        let topics = log.topics.iter().copied();
        match self.kind {
            ListingEventKind::Created => {
                let event = ListingCreated::decode_raw_log(topics, &log.data, true)?;
                Ok((event.party, event.listingID, event.ipfsHash))
            }
            ListingEventKind::Updated => {
                let event = ListingUpdated::decode_raw_log(topics, &log.data, true)?;
                Ok((event.party, event.listingID, event.ipfsHash))
            }
            ListingEventKind::Withdrawn => {
                let event = ListingWithdrawn::decode_raw_log(topics, &log.data, true)?;
                Ok((event.party, event.listingID, event.ipfsHash))
            }
        }
    }
}

impl LogDecoder for ListingDecoder {
    fn event_name(&self) -> &'static str {
        self.kind.as_str()
    }

    fn signature(&self) -> B256 {
        match self.kind {
            ListingEventKind::Created => ListingCreated::SIGNATURE_HASH,
            ListingEventKind::Updated => ListingUpdated::SIGNATURE_HASH,
            ListingEventKind::Withdrawn => ListingWithdrawn::SIGNATURE_HASH,
        }
    }

    fn decode(&self, log: &RawLog) -> IndexerResult<Option<DomainRecord>> {
        let (party, listing_id, ipfs_hash) = self
            .decode_parts(log)
            .map_err(|e| malformed(log, self.event_name(), e))?;

        let listing_id = listing_id.to_string();
        let party = party.to_string();
        let natural_key = natural_key(log, self.event_name(), &[party.clone(), listing_id.clone()]);

        Ok(Some(DomainRecord::Listing(ListingEvent {
            natural_key,
            contract_address: log.contract_address.to_string(),
            event_name: self.kind,
            listing_id,
            party,
            ipfs_hash: ipfs_hash_from_bytes32(&ipfs_hash),
            metadata: ListingMetadata::default(),
            block_number: log.block_height,
            tx_hash: log.tx_hash.to_string(),
            log_index: log.log_index,
        })))
    }
}

/// Offers come from the marketplace contracts too but carry no listing data
pub struct OfferDecoder;

impl LogDecoder for OfferDecoder {
    fn event_name(&self) -> &'static str {
        "OfferCreated"
    }

    fn signature(&self) -> B256 {
        OfferCreated::SIGNATURE_HASH
    }

    fn decode(&self, _log: &RawLog) -> IndexerResult<Option<DomainRecord>> {
        Ok(None)
    }
}
