//! Origin Indexer
//!
//! Tracks Origin marketplace listings and dshop products on-chain and
//! republishes them to the analytics warehouse.

use anyhow::Result;
use clap::{Parser, Subcommand};
use origin_indexer::adapters::{BigQueryWarehouse, DeadLetterStore, IpfsGateway, JsonRpcChainClient, PostgresStore};
use origin_indexer::config::IndexerConfig;
use origin_indexer::core::{ChainPort, DeadLetterPort, MetadataPort, PersistencePort, StreamId, WarehousePort};
use origin_indexer::domain::EventExtractor;
use origin_indexer::pipeline::{contract_addresses, watch_health, StreamPipeline};
use origin_indexer::services::{ListingEnricher, Publisher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "origin-indexer")]
#[command(about = "Origin marketplace and dshop chain ETL")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "indexer.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    /// Dry run mode (validate config and exit)
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingestion pipeline (default)
    Run,
    /// Move a stream's checkpoint back, dropping records above it
    ResetCheckpoint {
        #[arg(long)]
        stream: StreamId,
        #[arg(long)]
        height: u64,
    },
    /// Inspect or replay batches the warehouse never accepted
    DeadLetters {
        #[command(subcommand)]
        action: DeadLetterCommand,
    },
}

#[derive(Subcommand)]
enum DeadLetterCommand {
    List {
        #[arg(long)]
        stream: Option<StreamId>,
    },
    Replay {
        #[arg(long)]
        stream: Option<StreamId>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = IndexerConfig::load(Some(cli.config.as_path()))?;

    // Override log level if provided
    if let Some(log_level) = cli.log_level {
        config.monitoring.log_level = log_level;
    }

    // Initialize logging
    init_logging(&config)?;

    if !cli.config.exists() {
        warn!("Config file not found, using defaults and environment: {:?}", cli.config);
    }

    info!("Starting Origin Indexer");
    info!("Chain endpoint: {}", config.chain.endpoint);
    info!("Dead-letter path: {:?}", config.dead_letter.path);

    // Validate configuration and create directories
    config.validate()?;
    config.ensure_directories()?;
    info!("Configuration validated successfully");

    if cli.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        return Ok(());
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::ResetCheckpoint { stream, height } => reset_checkpoint(&config, stream, height).await,
        Command::DeadLetters { action } => dead_letters(&config, action).await,
    }
}

async fn run(config: IndexerConfig) -> Result<()> {
    let streams = config.streams.enabled();
    info!("Enabled streams: {:?}", streams);

    let chain: Arc<dyn ChainPort> = Arc::new(JsonRpcChainClient::new(&config.chain));

    info!("Initializing database connection...");
    let postgres = PostgresStore::connect(&config.database).await?;
    postgres.health_check().await?;
    let store: Arc<dyn PersistencePort> = Arc::new(postgres);

    let dead_letters: Arc<dyn DeadLetterPort> = Arc::new(DeadLetterStore::open(&config.dead_letter)?);
    let warehouse: Arc<dyn WarehousePort> = Arc::new(BigQueryWarehouse::new(&config.warehouse, &streams)?);
    let publisher = Arc::new(Publisher::new(warehouse, dead_letters, &config.warehouse));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    let metadata: Option<Arc<dyn MetadataPort>> = if config.ipfs.enabled {
        Some(Arc::new(IpfsGateway::new(&config.ipfs)?))
    } else {
        warn!("IPFS enrichment disabled, listing metadata columns stay empty");
        None
    };

    for stream in streams {
        let contracts = contract_addresses(stream, config.streams.get(stream))?;
        let mut pipeline = StreamPipeline::new(
            EventExtractor::for_stream(stream, contracts),
            chain.clone(),
            store.clone(),
            publisher.clone(),
            &config.pipeline,
        );
        if let (StreamId::Marketplace, Some(source)) = (stream, &metadata) {
            pipeline = pipeline.with_enricher(ListingEnricher::new(
                source.clone(),
                config.ipfs.max_concurrent_requests,
            ));
        }

        tokio::spawn(watch_health(
            pipeline.status(),
            config.monitoring.unhealthy_after_failures,
        ));
        handles.push(tokio::spawn(pipeline.run(shutdown_rx.clone())));
    }

    info!("Indexer started successfully. Press Ctrl+C to shutdown.");
    shutdown_signal().await;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);

    let grace = Duration::from_secs(config.pipeline.shutdown_grace_secs);
    match tokio::time::timeout(grace, futures::future::join_all(handles)).await {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    error!("Pipeline task error: {}", e);
                }
            }
        }
        Err(_) => warn!("Pipelines did not stop within {:?}, exiting anyway", grace),
    }

    info!("Shutting down Origin Indexer");
    Ok(())
}

async fn reset_checkpoint(config: &IndexerConfig, stream: StreamId, height: u64) -> Result<()> {
    let store = PostgresStore::connect(&config.database).await?;
    let previous = store.checkpoint(stream).await?;
    store.reset_checkpoint(stream, height).await?;

    info!(
        "Checkpoint for {} moved from {:?} to {}",
        stream,
        previous.map(|c| c.last_processed_height),
        height
    );
    Ok(())
}

async fn dead_letters(config: &IndexerConfig, action: DeadLetterCommand) -> Result<()> {
    let store = Arc::new(DeadLetterStore::open(&config.dead_letter)?);

    match action {
        DeadLetterCommand::List { stream } => {
            let letters = store.list(stream).await?;
            for (key, letter) in &letters {
                println!(
                    "{}\trecords={}\tattempts={}\tcreated_at={}\terror={}",
                    key,
                    letter.records.len(),
                    letter.attempts,
                    letter.created_at.to_rfc3339(),
                    letter.last_error
                );
            }
            info!("{} dead letters", letters.len());
        }
        DeadLetterCommand::Replay { stream } => {
            let streams = match stream {
                Some(stream) => vec![stream],
                None => config.streams.enabled(),
            };
            let warehouse: Arc<dyn WarehousePort> = Arc::new(BigQueryWarehouse::new(&config.warehouse, &streams)?);
            let publisher = Publisher::new(warehouse, store, &config.warehouse);

            let report = publisher.replay_dead_letters(stream).await?;
            info!(
                "Replayed {} dead letters ({} rows), {} still failing",
                report.replayed, report.rows, report.still_failing
            );
        }
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_logging(config: &IndexerConfig) -> Result<()> {
    let log_level = config.monitoring.log_level.parse()
        .unwrap_or(tracing::Level::INFO);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("origin_indexer={},sqlx=warn", log_level).into());

    if config.monitoring.structured_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    Ok(())
}
