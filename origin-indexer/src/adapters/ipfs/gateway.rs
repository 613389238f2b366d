//! HTTP gateway reads of listing documents

use crate::config::IpfsConfig;
use crate::core::{IndexerError, IndexerResult, MetadataPort};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Reads `/ipfs/<hash>` from a list of public gateways, first answer wins
pub struct IpfsGateway {
    client: reqwest::Client,
    gateways: Vec<String>,
}

impl IpfsGateway {
    pub fn new(config: &IpfsConfig) -> IndexerResult<Self> {
        if config.gateways.is_empty() {
            return Err(IndexerError::Configuration("no IPFS gateways configured".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| IndexerError::Configuration(format!("IPFS HTTP client: {}", e)))?;

        Ok(Self {
            client,
            gateways: config
                .gateways
                .iter()
                .map(|g| g.trim_end_matches('/').to_string())
                .collect(),
        })
    }

    fn document_url(gateway: &str, ipfs_hash: &str) -> String {
        format!("{}/ipfs/{}", gateway, ipfs_hash)
    }

    async fn fetch(&self, url: &str) -> IndexerResult<Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IndexerError::TransientFetch(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(IndexerError::TransientFetch(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| IndexerError::Decode(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl MetadataPort for IpfsGateway {
    async fn listing_document(&self, ipfs_hash: &str) -> IndexerResult<Value> {
        let mut last_error = None;
        for gateway in &self.gateways {
            let url = Self::document_url(gateway, ipfs_hash);
            match self.fetch(&url).await {
                Ok(document) => return Ok(document),
                Err(e) => {
                    debug!(gateway = %gateway, ipfs_hash, "Gateway read failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            IndexerError::Configuration("no IPFS gateways configured".to_string())
        }))
    }
}
