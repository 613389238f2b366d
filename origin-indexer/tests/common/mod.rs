//! Shared fixtures for integration tests

#![allow(dead_code)]

pub mod http;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolEvent;
use origin_indexer::adapters::{DeadLetterStore, MemoryStore, MockChain, MockWarehouse};
use origin_indexer::config::{DeadLetterConfig, PipelineConfig, WarehouseConfig, MARKETPLACE_CONTRACTS};
use async_trait::async_trait;
use origin_indexer::core::{ChainPort, IndexerResult, RawBlock, RawLog, StreamId};
use origin_indexer::domain::processors::events::{ListingCreated, ListingUpdated, ProductPublished};
use origin_indexer::domain::EventExtractor;
use origin_indexer::pipeline::StreamPipeline;
use origin_indexer::services::Publisher;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const DSHOP_CONTRACT: &str = "0x00000000000000000000000000000000000d5a0b";

pub fn marketplace_contract() -> Address {
    MARKETPLACE_CONTRACTS[0].parse().unwrap()
}

pub fn dshop_contract() -> Address {
    DSHOP_CONTRACT.parse().unwrap()
}

pub fn seller() -> Address {
    Address::repeat_byte(0x5e)
}

fn tx_hash(height: u64, log_index: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&height.to_be_bytes());
    bytes[24..].copy_from_slice(&log_index.to_be_bytes());
    B256::from(bytes)
}

/// Wrap encoded topics and data into a log at the given position
pub fn raw_log(contract: Address, topics: Vec<B256>, data: Bytes, height: u64, log_index: u64) -> RawLog {
    RawLog {
        block_height: height,
        block_hash: B256::ZERO,
        tx_hash: tx_hash(height, log_index),
        transaction_index: log_index / 4,
        log_index,
        contract_address: contract,
        topics,
        data,
    }
}

pub fn listing_created_log(listing_id: u64, height: u64, log_index: u64) -> RawLog {
    let event = ListingCreated {
        party: seller(),
        listingID: U256::from(listing_id),
        ipfsHash: B256::repeat_byte(listing_id as u8),
    };
    let encoded = event.encode_log_data();
    raw_log(
        marketplace_contract(),
        encoded.topics().to_vec(),
        encoded.data.clone(),
        height,
        log_index,
    )
}

pub fn listing_updated_log(listing_id: u64, height: u64, log_index: u64) -> RawLog {
    let event = ListingUpdated {
        party: seller(),
        listingID: U256::from(listing_id),
        ipfsHash: B256::repeat_byte(0xee),
    };
    let encoded = event.encode_log_data();
    raw_log(
        marketplace_contract(),
        encoded.topics().to_vec(),
        encoded.data.clone(),
        height,
        log_index,
    )
}

/// Listing signature with a payload that cannot be decoded
pub fn malformed_listing_log(height: u64, log_index: u64) -> RawLog {
    let mut log = listing_created_log(1, height, log_index);
    log.data = Bytes::from(vec![0xde, 0xad]);
    log
}

pub fn product_event(title: &str, price: U256) -> ProductPublished {
    ProductPublished {
        listingID: U256::from(7u64),
        productID: B256::repeat_byte(0x42),
        ipfsPath: "/ipfs/QmProduct/data.json".to_string(),
        externalId: "ext-1".to_string(),
        parentExternalId: String::new(),
        title: title.to_string(),
        description: "Organic cotton".to_string(),
        price,
        currency: "USD".to_string(),
        option1: "Large".to_string(),
        option2: String::new(),
        option3: String::new(),
        image: "shirt.png".to_string(),
    }
}

pub fn product_log(event: &ProductPublished, height: u64, log_index: u64) -> RawLog {
    let encoded = event.encode_log_data();
    raw_log(
        dshop_contract(),
        encoded.topics().to_vec(),
        encoded.data.clone(),
        height,
        log_index,
    )
}

pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        poll_interval_secs: 1,
        confirmation_depth: 3,
        max_batch_blocks: 50,
        start_block: 101,
        reorg_window: 64,
        backoff_initial_ms: 1,
        backoff_max_secs: 1,
        shutdown_grace_secs: 5,
    }
}

pub fn warehouse_config() -> WarehouseConfig {
    WarehouseConfig {
        marketplace_table_id: "origin.analytics.marketplace".to_string(),
        dshop_table_id: "origin.analytics.dshop".to_string(),
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        ..WarehouseConfig::default()
    }
}

pub fn open_dead_letters(temp_dir: &TempDir) -> DeadLetterStore {
    DeadLetterStore::open(&DeadLetterConfig {
        path: temp_dir.path().to_path_buf(),
        enable_compression: false,
        max_open_files: 64,
    })
    .unwrap()
}

/// A marketplace pipeline wired to in-memory collaborators
pub struct Harness {
    pub chain: Arc<MockChain>,
    pub store: Arc<MemoryStore>,
    pub warehouse: Arc<MockWarehouse>,
    pub dead_letters: Arc<DeadLetterStore>,
    pub pipeline: StreamPipeline,
    _temp_dir: TempDir,
}

impl Harness {
    pub fn new(stream: StreamId, head: u64) -> Self {
        Self::with_config(stream, head, pipeline_config())
    }

    pub fn with_config(stream: StreamId, head: u64, config: PipelineConfig) -> Self {
        let chain = Arc::new(MockChain::new(head));
        Self::with_chain(stream, chain.clone(), chain, config)
    }

    /// Harness whose pipeline talks to `port`, which wraps `chain`
    pub fn with_chain(
        stream: StreamId,
        chain: Arc<MockChain>,
        port: Arc<dyn ChainPort>,
        config: PipelineConfig,
    ) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let warehouse = Arc::new(MockWarehouse::default());
        let dead_letters = Arc::new(open_dead_letters(&temp_dir));

        let publisher = Arc::new(Publisher::new(
            warehouse.clone(),
            dead_letters.clone(),
            &warehouse_config(),
        ));
        let contracts = match stream {
            StreamId::Marketplace => vec![marketplace_contract()],
            StreamId::Dshop => vec![dshop_contract()],
        };
        let pipeline = StreamPipeline::new(
            EventExtractor::for_stream(stream, contracts),
            port,
            store.clone(),
            publisher,
            &config,
        );

        Self {
            chain,
            store,
            warehouse,
            dead_letters,
            pipeline,
            _temp_dir: temp_dir,
        }
    }
}

type ChainAction = Box<dyn FnOnce(&MockChain) + Send>;

/// Chain that runs an action on the mock right before answering its Nth
/// head request, to change the chain in the middle of a cycle.
pub struct ScriptedChain {
    inner: Arc<MockChain>,
    head_calls: AtomicU32,
    trigger_at: u32,
    action: Mutex<Option<ChainAction>>,
}

impl ScriptedChain {
    pub fn on_head_call<F>(inner: Arc<MockChain>, call: u32, action: F) -> Self
    where
        F: FnOnce(&MockChain) + Send + 'static,
    {
        Self {
            inner,
            head_calls: AtomicU32::new(0),
            trigger_at: call,
            action: Mutex::new(Some(Box::new(action))),
        }
    }
}

#[async_trait]
impl ChainPort for ScriptedChain {
    async fn head(&self) -> IndexerResult<u64> {
        let call = self.head_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.trigger_at {
            let action = self.action.lock().unwrap().take();
            if let Some(action) = action {
                action(&self.inner);
            }
        }
        self.inner.head().await
    }

    async fn block_range(&self, lo: u64, hi: u64) -> IndexerResult<Vec<RawBlock>> {
        self.inner.block_range(lo, hi).await
    }

    async fn logs(
        &self,
        addresses: &[Address],
        topics: &[B256],
        lo: u64,
        hi: u64,
    ) -> IndexerResult<Vec<RawLog>> {
        self.inner.logs(addresses, topics, lo, hi).await
    }
}

/// Marketplace harness whose chain runs `action` on the given head request
pub fn scripted_harness<F>(head: u64, call: u32, action: F) -> Harness
where
    F: FnOnce(&MockChain) + Send + 'static,
{
    let chain = Arc::new(MockChain::new(head));
    let port = Arc::new(ScriptedChain::on_head_call(chain.clone(), call, action));
    Harness::with_chain(StreamId::Marketplace, chain, port, pipeline_config())
}
