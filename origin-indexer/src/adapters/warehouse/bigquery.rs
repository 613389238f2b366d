//! BigQuery streaming-insert adapter
//!
//! Rows go through `tabledata.insertAll` with the record's natural key as
//! `insertId`, so a retried batch is deduplicated on the warehouse side.
//! Row layouts match the table schemas shipped under `schemas/`.

use super::auth::TokenSource;
use crate::config::WarehouseConfig;
use crate::core::{IndexerError, IndexerResult, StreamId, WarehousePort};
use crate::domain::models::ExportBatch;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Fully qualified destination table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    /// Parse `project.dataset.table`
    pub fn parse(table_id: &str) -> IndexerResult<Self> {
        let parts: Vec<&str> = table_id.split('.').collect();
        match parts.as_slice() {
            [project, dataset, table] if !project.is_empty() && !dataset.is_empty() && !table.is_empty() => {
                Ok(Self {
                    project: project.to_string(),
                    dataset: dataset.to_string(),
                    table: table.to_string(),
                })
            }
            _ => Err(IndexerError::Configuration(format!(
                "table id '{}' must look like project.dataset.table",
                table_id
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRequest {
    kind: &'static str,
    skip_invalid_rows: bool,
    ignore_unknown_values: bool,
    /// `{insertId, json}` envelopes from `DomainRecord::insert_row`
    rows: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<RowErrors>,
}

#[derive(Debug, Deserialize)]
struct RowErrors {
    index: u64,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

/// Reasons BigQuery reports for row failures that a retry can fix
const RETRYABLE_REASONS: [&str; 4] = ["backendError", "internalError", "rateLimitExceeded", "stopped"];

/// BigQuery client
pub struct BigQueryWarehouse {
    client: reqwest::Client,
    api_endpoint: String,
    tables: HashMap<StreamId, TableRef>,
    tokens: TokenSource,
}

impl BigQueryWarehouse {
    /// Create a client for the streams' configured tables
    pub fn new(config: &WarehouseConfig, streams: &[StreamId]) -> IndexerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| IndexerError::Configuration(format!("HTTP client: {}", e)))?;

        let tables = streams
            .iter()
            .map(|stream| Ok((*stream, TableRef::parse(config.table_id(*stream))?)))
            .collect::<IndexerResult<HashMap<_, _>>>()?;

        let tokens = TokenSource::from_credentials(config.credentials_path.as_deref(), client.clone())?;

        Ok(Self {
            client,
            api_endpoint: config.api_endpoint.trim_end_matches('/').to_string(),
            tables,
            tokens,
        })
    }

    fn insert_url(&self, table: &TableRef) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables/{}/insertAll",
            self.api_endpoint, table.project, table.dataset, table.table
        )
    }
}

/// Turn per-row insert errors into a batch-level outcome
fn classify_insert_errors(errors: &[RowErrors]) -> IndexerError {
    let summary = errors
        .iter()
        .take(3)
        .map(|row| {
            let detail = row
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.reason, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            format!("row {} ({})", row.index, detail)
        })
        .collect::<Vec<_>>()
        .join(", ");

    let retryable = errors
        .iter()
        .flat_map(|row| row.errors.iter())
        .all(|e| RETRYABLE_REASONS.contains(&e.reason.as_str()));

    let message = format!("{} rows failed: {}", errors.len(), summary);
    if retryable {
        IndexerError::TransientFetch(message)
    } else {
        IndexerError::WarehouseRejected(message)
    }
}

#[async_trait]
impl WarehousePort for BigQueryWarehouse {
    async fn insert_rows(&self, batch: &ExportBatch) -> IndexerResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let table = self.tables.get(&batch.stream_id).ok_or_else(|| {
            IndexerError::Configuration(format!("no warehouse table for stream {}", batch.stream_id))
        })?;

        let written_at = Utc::now();
        let body = InsertAllRequest {
            kind: "bigquery#tableDataInsertAllRequest",
            skip_invalid_rows: false,
            ignore_unknown_values: false,
            rows: batch.records.iter().map(|record| record.insert_row(written_at)).collect(),
        };

        let mut request = self.client.post(self.insert_url(table)).json(&body);
        if let Some(token) = self.tokens.token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            // Expired or revoked token, the retry mints a fresh one
            self.tokens.invalidate().await;
            return Err(IndexerError::TransientFetch(format!(
                "warehouse refused credentials for {}",
                table.table
            )));
        }

        let response: InsertAllResponse = response.error_for_status()?.json().await?;

        if !response.insert_errors.is_empty() {
            return Err(classify_insert_errors(&response.insert_errors));
        }

        debug!(
            stream = %batch.stream_id,
            table = %table.table,
            rows = batch.len(),
            "Inserted rows"
        );
        Ok(batch.len())
    }
}
