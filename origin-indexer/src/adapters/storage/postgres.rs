//! PostgreSQL persistence adapter
//!
//! Checkpoints and extracted records live in the same database so a window
//! is committed in a single transaction.

use crate::config::DatabaseConfig;
use crate::core::{Checkpoint, IndexerError, IndexerResult, PersistencePort, StreamId};
use crate::domain::models::{DomainRecord, ListingEvent, ListingEventKind, ListingMetadata, ProductEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{debug, info};

const UPSERT_LISTING: &str = r#"
    INSERT INTO marketplace_listings (
        natural_key, contract_address, event_name, listing_id, party,
        ipfs_hash, listing_type, category, subcategory, language, title,
        description, price, currency, block_number, tx_hash, log_index
    ) VALUES (
        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
    )
    ON CONFLICT (natural_key) DO UPDATE SET
        contract_address = EXCLUDED.contract_address,
        event_name = EXCLUDED.event_name,
        listing_id = EXCLUDED.listing_id,
        party = EXCLUDED.party,
        ipfs_hash = EXCLUDED.ipfs_hash,
        listing_type = EXCLUDED.listing_type,
        category = EXCLUDED.category,
        subcategory = EXCLUDED.subcategory,
        language = EXCLUDED.language,
        title = EXCLUDED.title,
        description = EXCLUDED.description,
        price = EXCLUDED.price,
        currency = EXCLUDED.currency,
        block_number = EXCLUDED.block_number,
        tx_hash = EXCLUDED.tx_hash,
        log_index = EXCLUDED.log_index,
        indexed_at = NOW()
"#;

const UPSERT_PRODUCT: &str = r#"
    INSERT INTO dshop_products (
        natural_key, contract_address, listing_id, product_id, ipfs_path,
        external_id, parent_external_id, title, description, price, currency,
        option1, option2, option3, image, block_number, tx_hash, log_index
    ) VALUES (
        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18
    )
    ON CONFLICT (natural_key) DO UPDATE SET
        contract_address = EXCLUDED.contract_address,
        listing_id = EXCLUDED.listing_id,
        product_id = EXCLUDED.product_id,
        ipfs_path = EXCLUDED.ipfs_path,
        external_id = EXCLUDED.external_id,
        parent_external_id = EXCLUDED.parent_external_id,
        title = EXCLUDED.title,
        description = EXCLUDED.description,
        price = EXCLUDED.price,
        currency = EXCLUDED.currency,
        option1 = EXCLUDED.option1,
        option2 = EXCLUDED.option2,
        option3 = EXCLUDED.option3,
        image = EXCLUDED.image,
        block_number = EXCLUDED.block_number,
        tx_hash = EXCLUDED.tx_hash,
        log_index = EXCLUDED.log_index,
        indexed_at = NOW()
"#;

const UPSERT_CHECKPOINT: &str = r#"
    INSERT INTO checkpoints (stream_id, last_processed_height, updated_at)
    VALUES ($1, $2, NOW())
    ON CONFLICT (stream_id) DO UPDATE SET
        last_processed_height = EXCLUDED.last_processed_height,
        updated_at = NOW()
"#;

fn table_for(stream: StreamId) -> &'static str {
    match stream {
        StreamId::Marketplace => "marketplace_listings",
        StreamId::Dshop => "dshop_products",
    }
}

/// Heights are u64 on-chain and BIGINT in Postgres
fn to_db_height(height: u64) -> IndexerResult<i64> {
    i64::try_from(height)
        .map_err(|_| IndexerError::Persistence(format!("height {} does not fit BIGINT", height)))
}

fn from_db_height(value: i64) -> IndexerResult<u64> {
    u64::try_from(value)
        .map_err(|_| IndexerError::Persistence(format!("negative height {} in database", value)))
}

/// PostgreSQL store
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL
    pub async fn connect(config: &DatabaseConfig) -> IndexerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.postgres_url)
            .await?;

        info!("PostgreSQL connected successfully");

        Ok(Self { pool })
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> IndexerResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| IndexerError::Persistence(format!("migration failed: {}", e)))?;
        debug!("Database schema up to date");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn upsert_record(tx: &mut Transaction<'static, Postgres>, record: &DomainRecord) -> IndexerResult<()> {
        match record {
            DomainRecord::Listing(l) => {
                sqlx::query(UPSERT_LISTING)
                    .bind(&l.natural_key)
                    .bind(&l.contract_address)
                    .bind(l.event_name.as_str())
                    .bind(&l.listing_id)
                    .bind(&l.party)
                    .bind(&l.ipfs_hash)
                    .bind(&l.metadata.listing_type)
                    .bind(&l.metadata.category)
                    .bind(&l.metadata.subcategory)
                    .bind(&l.metadata.language)
                    .bind(&l.metadata.title)
                    .bind(&l.metadata.description)
                    .bind(&l.metadata.price)
                    .bind(&l.metadata.currency)
                    .bind(to_db_height(l.block_number)?)
                    .bind(&l.tx_hash)
                    .bind(to_db_height(l.log_index)?)
                    .execute(&mut **tx)
                    .await?;
            }
            DomainRecord::Product(p) => {
                sqlx::query(UPSERT_PRODUCT)
                    .bind(&p.natural_key)
                    .bind(&p.contract_address)
                    .bind(&p.listing_id)
                    .bind(&p.product_id)
                    .bind(&p.ipfs_path)
                    .bind(&p.external_id)
                    .bind(&p.parent_external_id)
                    .bind(&p.title)
                    .bind(&p.description)
                    .bind(p.price)
                    .bind(&p.currency)
                    .bind(&p.option1)
                    .bind(&p.option2)
                    .bind(&p.option3)
                    .bind(&p.image)
                    .bind(to_db_height(p.block_number)?)
                    .bind(&p.tx_hash)
                    .bind(to_db_height(p.log_index)?)
                    .execute(&mut **tx)
                    .await?;
            }
        }
        Ok(())
    }

    async fn purge_above(
        tx: &mut Transaction<'static, Postgres>,
        stream: StreamId,
        height: u64,
    ) -> IndexerResult<u64> {
        let query = format!("DELETE FROM {} WHERE block_number > $1", table_for(stream));
        let result = sqlx::query(&query)
            .bind(to_db_height(height)?)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn write_checkpoint(
        tx: &mut Transaction<'static, Postgres>,
        stream: StreamId,
        height: u64,
    ) -> IndexerResult<()> {
        sqlx::query(UPSERT_CHECKPOINT)
            .bind(stream.as_str())
            .bind(to_db_height(height)?)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    fn listing_from_row(row: &PgRow) -> IndexerResult<DomainRecord> {
        let event_name: String = row.try_get("event_name")?;
        let event_name = ListingEventKind::parse(&event_name)
            .ok_or_else(|| IndexerError::Persistence(format!("unknown event name {}", event_name)))?;

        Ok(DomainRecord::Listing(ListingEvent {
            natural_key: row.try_get("natural_key")?,
            contract_address: row.try_get("contract_address")?,
            event_name,
            listing_id: row.try_get("listing_id")?,
            party: row.try_get("party")?,
            ipfs_hash: row.try_get("ipfs_hash")?,
            metadata: ListingMetadata {
                listing_type: row.try_get("listing_type")?,
                category: row.try_get("category")?,
                subcategory: row.try_get("subcategory")?,
                language: row.try_get("language")?,
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                price: row.try_get("price")?,
                currency: row.try_get("currency")?,
            },
            block_number: from_db_height(row.try_get("block_number")?)?,
            tx_hash: row.try_get("tx_hash")?,
            log_index: from_db_height(row.try_get("log_index")?)?,
        }))
    }

    fn product_from_row(row: &PgRow) -> IndexerResult<DomainRecord> {
        Ok(DomainRecord::Product(ProductEvent {
            natural_key: row.try_get("natural_key")?,
            contract_address: row.try_get("contract_address")?,
            listing_id: row.try_get("listing_id")?,
            product_id: row.try_get("product_id")?,
            ipfs_path: row.try_get("ipfs_path")?,
            external_id: row.try_get("external_id")?,
            parent_external_id: row.try_get("parent_external_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            price: row.try_get("price")?,
            currency: row.try_get("currency")?,
            option1: row.try_get("option1")?,
            option2: row.try_get("option2")?,
            option3: row.try_get("option3")?,
            image: row.try_get("image")?,
            block_number: from_db_height(row.try_get("block_number")?)?,
            tx_hash: row.try_get("tx_hash")?,
            log_index: from_db_height(row.try_get("log_index")?)?,
        }))
    }
}

#[async_trait]
impl PersistencePort for PostgresStore {
    async fn checkpoint(&self, stream: StreamId) -> IndexerResult<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT last_processed_height, updated_at FROM checkpoints WHERE stream_id = $1",
        )
        .bind(stream.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let height: i64 = row.try_get("last_processed_height")?;
                let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
                Ok(Some(Checkpoint {
                    stream_id: stream,
                    last_processed_height: from_db_height(height)?,
                    updated_at,
                }))
            }
            None => Ok(None),
        }
    }

    async fn ensure_checkpoint(&self, stream: StreamId, initial_height: u64) -> IndexerResult<Checkpoint> {
        sqlx::query(
            r#"
            INSERT INTO checkpoints (stream_id, last_processed_height, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (stream_id) DO NOTHING
            "#,
        )
        .bind(stream.as_str())
        .bind(to_db_height(initial_height)?)
        .execute(&self.pool)
        .await?;

        self.checkpoint(stream)
            .await?
            .ok_or_else(|| IndexerError::Persistence(format!("checkpoint for {} vanished", stream)))
    }

    async fn commit(
        &self,
        stream: StreamId,
        new_checkpoint_height: u64,
        records: &[DomainRecord],
        superseded_above: Option<u64>,
    ) -> IndexerResult<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(height) = superseded_above {
            let purged = Self::purge_above(&mut tx, stream, height).await?;
            debug!(stream = %stream, height, purged, "Purged superseded records");
        }

        for record in records {
            Self::upsert_record(&mut tx, record).await?;
        }

        // Checkpoint last, inside the same transaction
        Self::write_checkpoint(&mut tx, stream, new_checkpoint_height).await?;
        tx.commit().await?;

        debug!(
            stream = %stream,
            checkpoint = new_checkpoint_height,
            records = records.len(),
            "Committed window"
        );
        Ok(())
    }

    async fn reset_checkpoint(&self, stream: StreamId, height: u64) -> IndexerResult<()> {
        let mut tx = self.pool.begin().await?;
        let purged = Self::purge_above(&mut tx, stream, height).await?;
        Self::write_checkpoint(&mut tx, stream, height).await?;
        tx.commit().await?;

        info!(stream = %stream, height, purged, "Checkpoint reset");
        Ok(())
    }

    async fn records(&self, stream: StreamId) -> IndexerResult<Vec<DomainRecord>> {
        let query = format!(
            "SELECT * FROM {} ORDER BY block_number, log_index",
            table_for(stream)
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| match stream {
                StreamId::Marketplace => Self::listing_from_row(row),
                StreamId::Dshop => Self::product_from_row(row),
            })
            .collect()
    }

    async fn health_check(&self) -> IndexerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
