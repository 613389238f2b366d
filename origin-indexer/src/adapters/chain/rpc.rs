//! Lightweight Ethereum JSON-RPC client
//!
//! Implements only the three methods the pipeline needs, over a blocking
//! ureq agent driven from `spawn_blocking`.

use crate::config::ChainConfig;
use crate::core::{ChainPort, IndexerError, IndexerResult, RawBlock, RawLog};
use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// JSON-RPC chain client
pub struct JsonRpcChainClient {
    url: String,
    agent: ureq::Agent,
    request_timeout: Duration,
    min_request_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

/// RPC response wrapper
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// RPC error structure
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: String,
    hash: B256,
    parent_hash: B256,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    block_number: String,
    block_hash: B256,
    transaction_hash: B256,
    transaction_index: String,
    log_index: String,
    #[serde(default)]
    removed: bool,
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_quantity(value: &str) -> IndexerResult<u64> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| IndexerError::Decode(format!("quantity without 0x prefix: {}", value)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| IndexerError::Decode(format!("invalid quantity {}: {}", value, e)))
}

fn to_quantity(value: u64) -> String {
    format!("{:#x}", value)
}

impl RpcBlock {
    fn into_raw(self) -> IndexerResult<RawBlock> {
        Ok(RawBlock {
            height: parse_quantity(&self.number)?,
            hash: self.hash,
            parent_hash: self.parent_hash,
            timestamp: parse_quantity(&self.timestamp)?,
            logs: Vec::new(),
        })
    }
}

impl RpcLog {
    fn into_raw(self) -> IndexerResult<RawLog> {
        Ok(RawLog {
            block_height: parse_quantity(&self.block_number)?,
            block_hash: self.block_hash,
            tx_hash: self.transaction_hash,
            transaction_index: parse_quantity(&self.transaction_index)?,
            log_index: parse_quantity(&self.log_index)?,
            contract_address: self.address,
            topics: self.topics,
            data: self.data,
        })
    }
}

impl JsonRpcChainClient {
    /// Create a new client from the chain configuration
    pub fn new(config: &ChainConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(config.connect_timeout_secs))
            .timeout_read(config.request_timeout())
            .build();

        Self {
            url: config.endpoint.clone(),
            agent,
            request_timeout: config.request_timeout(),
            min_request_interval: Duration::from_millis(config.min_request_interval_ms),
            last_request: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.url
    }

    /// Space requests out by the configured minimum interval
    async fn throttle(&self) {
        if self.min_request_interval.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_request_interval {
                tokio::time::sleep(self.min_request_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Make a JSON-RPC call
    async fn call<T>(&self, method: &str, params: Value) -> IndexerResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.throttle().await;
        trace!("RPC call: {} with params: {}", method, params);

        let request_body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        // Use blocking call since ureq is sync
        let request = tokio::task::spawn_blocking({
            let agent = self.agent.clone();
            let url = self.url.clone();
            let body = request_body.to_string();

            move || {
                let response = agent
                    .post(&url)
                    .set("Content-Type", "application/json")
                    .send_string(&body)?;

                let text = response
                    .into_string()
                    .map_err(|e| IndexerError::TransientFetch(e.to_string()))?;
                Ok::<String, IndexerError>(text)
            }
        });

        let response_body = tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| IndexerError::Timeout(self.request_timeout))?
            .map_err(|e| IndexerError::TransientFetch(format!("RPC task failed: {}", e)))??;

        let rpc_response: RpcResponse<T> = serde_json::from_str(&response_body)?;

        if let Some(error) = rpc_response.error {
            return Err(IndexerError::TransientFetch(format!(
                "RPC error {} on {}: {}",
                error.code, method, error.message
            )));
        }

        rpc_response
            .result
            .ok_or_else(|| IndexerError::TransientFetch(format!("No result in {} response", method)))
    }

    async fn block_header(&self, height: u64) -> IndexerResult<RawBlock> {
        let block: Option<RpcBlock> = self
            .call("eth_getBlockByNumber", json!([to_quantity(height), false]))
            .await?;

        block
            .ok_or_else(|| IndexerError::TransientFetch(format!("block {} not available yet", height)))?
            .into_raw()
    }
}

#[async_trait]
impl ChainPort for JsonRpcChainClient {
    async fn head(&self) -> IndexerResult<u64> {
        let head: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&head)
    }

    async fn block_range(&self, lo: u64, hi: u64) -> IndexerResult<Vec<RawBlock>> {
        if lo > hi {
            return Err(IndexerError::InvalidRange { lo, hi });
        }

        let mut blocks = Vec::with_capacity((hi - lo + 1) as usize);
        for height in lo..=hi {
            blocks.push(self.block_header(height).await?);
        }

        debug!("Fetched {} block headers [{}, {}]", blocks.len(), lo, hi);
        Ok(blocks)
    }

    async fn logs(
        &self,
        addresses: &[Address],
        topics: &[B256],
        lo: u64,
        hi: u64,
    ) -> IndexerResult<Vec<RawLog>> {
        if lo > hi {
            return Err(IndexerError::InvalidRange { lo, hi });
        }
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let filter = json!({
            "fromBlock": to_quantity(lo),
            "toBlock": to_quantity(hi),
            "address": addresses,
            "topics": [topics],
        });

        let logs: Vec<RpcLog> = self.call("eth_getLogs", json!([filter])).await?;
        let logs = logs
            .into_iter()
            .filter(|log| !log.removed)
            .map(RpcLog::into_raw)
            .collect::<IndexerResult<Vec<_>>>()?;

        debug!("Fetched {} logs [{}, {}]", logs.len(), lo, hi);
        Ok(logs)
    }
}
