//! RocksDB-backed dead-letter queue

use crate::config::DeadLetterConfig;
use crate::core::{DeadLetterPort, IndexerError, IndexerResult, StreamId};
use crate::domain::models::DeadLetter;
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use tracing::{debug, info};

/// Column family names
pub struct ColumnFamilies;

impl ColumnFamilies {
    pub const DEAD_LETTERS: &'static str = "dead_letters";
}

/// Durable store of batches the warehouse never accepted
pub struct DeadLetterStore {
    db: DB,
}

impl DeadLetterStore {
    /// Open the queue with the specified configuration
    pub fn open(config: &DeadLetterConfig) -> IndexerResult<Self> {
        let path = &config.path;

        // Create directory if it doesn't exist
        if !path.exists() {
            std::fs::create_dir_all(path)
                .map_err(|e| IndexerError::DeadLetter(format!("{}: {}", path.display(), e)))?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);

        if config.enable_compression {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        let cfs = vec![ColumnFamilyDescriptor::new(
            ColumnFamilies::DEAD_LETTERS,
            Options::default(),
        )];
        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        info!("Dead-letter queue opened at: {:?}", path);

        Ok(Self { db })
    }

    fn cf(&self) -> IndexerResult<&rocksdb::ColumnFamily> {
        self.db.cf_handle(ColumnFamilies::DEAD_LETTERS).ok_or_else(|| {
            IndexerError::DeadLetter(format!(
                "Column family not found: {}",
                ColumnFamilies::DEAD_LETTERS
            ))
        })
    }

    /// Check that the database is operational
    pub fn health_check(&self) -> IndexerResult<()> {
        self.db.property_value("rocksdb.stats")?;
        Ok(())
    }
}

#[async_trait]
impl DeadLetterPort for DeadLetterStore {
    async fn store(&self, letter: &DeadLetter) -> IndexerResult<String> {
        let key = letter.key();
        let value = serde_json::to_vec(letter)?;
        self.db.put_cf(self.cf()?, key.as_bytes(), value)?;

        debug!("Stored dead letter {} ({} records)", key, letter.records.len());
        Ok(key)
    }

    async fn list(&self, stream: Option<StreamId>) -> IndexerResult<Vec<(String, DeadLetter)>> {
        let prefix = stream.map(|s| format!("{}/", s)).unwrap_or_default();
        let mode = IteratorMode::From(prefix.as_bytes(), Direction::Forward);

        let mut letters = Vec::new();
        for item in self.db.iterator_cf(self.cf()?, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| IndexerError::DeadLetter(format!("non-utf8 key: {}", e)))?;
            let letter: DeadLetter = serde_json::from_slice(&value)?;
            letters.push((key, letter));
        }
        Ok(letters)
    }

    async fn remove(&self, key: &str) -> IndexerResult<()> {
        self.db.delete_cf(self.cf()?, key.as_bytes())?;
        debug!("Removed dead letter {}", key);
        Ok(())
    }
}
