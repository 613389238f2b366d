//! Listing metadata enrichment
//!
//! Listing events only carry the IPFS hash of the listing document. Before a
//! window is committed the documents are read and their descriptive fields
//! copied onto the records. A document that cannot be read leaves the fields
//! empty; the window is never held back for it.

use crate::core::{IndexerResult, MetadataPort};
use crate::domain::models::{DomainRecord, ListingMetadata};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of enriching one window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub enriched: usize,
    pub failed: usize,
}

/// Fills `ListingMetadata` from the listing documents
pub struct ListingEnricher {
    source: Arc<dyn MetadataPort>,
    concurrency: usize,
}

impl ListingEnricher {
    pub fn new(source: Arc<dyn MetadataPort>, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn enrich(&self, records: &mut [DomainRecord]) -> EnrichmentReport {
        let hashes: BTreeSet<String> = records
            .iter()
            .filter_map(|record| match record {
                DomainRecord::Listing(l) if l.has_document() => Some(l.ipfs_hash.clone()),
                _ => None,
            })
            .collect();
        if hashes.is_empty() {
            return EnrichmentReport::default();
        }

        // One read per distinct document
        let documents: HashMap<String, IndexerResult<Value>> = stream::iter(hashes)
            .map(|hash| {
                let source = self.source.clone();
                async move {
                    let document = source.listing_document(&hash).await;
                    (hash, document)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = EnrichmentReport::default();
        for record in records.iter_mut() {
            let DomainRecord::Listing(listing) = record else {
                continue;
            };
            if !listing.has_document() {
                continue;
            }
            match documents.get(&listing.ipfs_hash) {
                Some(Ok(document)) => {
                    listing.metadata = ListingMetadata::from_document(document);
                    report.enriched += 1;
                }
                Some(Err(e)) => {
                    warn!(
                        listing_id = %listing.listing_id,
                        ipfs_hash = %listing.ipfs_hash,
                        "Listing document unavailable: {}", e
                    );
                    report.failed += 1;
                }
                None => {}
            }
        }

        debug!(enriched = report.enriched, failed = report.failed, "Listings enriched");
        report
    }
}
