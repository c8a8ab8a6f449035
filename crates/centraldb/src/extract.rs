// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Source extraction
//!
//! Queries a source store for every record in a time window and hands the
//! rows back as a lazy iterator, so arbitrarily large windows never have to
//! fit in memory.

use crate::config::SourceConfig;
use crate::flux_csv::FluxCsvReader;
use crate::record::{secs_to_ns, RawRecord};
use chrono::{DateTime, SecondsFormat};
use reqwest::blocking::Client;
use serde_json::json;
use thiserror::Error;

/// Extraction errors.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("query rejected with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("query failed: {0}")]
    Query(String),

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Lazily evaluated, time-ordered record sequence.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<RawRecord, ExtractError>> + 'a>;

/// Reads records from a source store.
pub trait Extractor {
    /// Stream every record with `start <= time < end` (Unix seconds).
    ///
    /// Without `end` the window is open through "now" at query time.
    fn query(
        &self,
        source: &SourceConfig,
        start: f64,
        end: Option<f64>,
    ) -> Result<RecordStream<'_>, ExtractError>;
}

/// Extractor for InfluxDB v2 sources (Flux over HTTP).
#[derive(Debug, Clone)]
pub struct InfluxExtractor {
    client: Client,
}

impl InfluxExtractor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Extractor for InfluxExtractor {
    fn query(
        &self,
        source: &SourceConfig,
        start: f64,
        end: Option<f64>,
    ) -> Result<RecordStream<'_>, ExtractError> {
        let flux = range_query(&source.bucket, start, end);
        tracing::debug!(source = %source.name, query = %flux, "Querying source");

        let response = self
            .client
            .post(format!("{}/api/v2/query", source.url.trim_end_matches('/')))
            .query(&[("org", source.org.as_str())])
            .header("Authorization", format!("Token {}", source.token))
            .header("Accept", "application/csv")
            .json(&json!({
                "query": flux,
                "type": "flux",
                "dialect": {
                    "header": true,
                    "delimiter": ",",
                    "annotations": ["datatype", "group", "default"],
                },
            }))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ExtractError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::new(FluxCsvReader::new(response)))
    }
}

/// Flux query selecting everything in `bucket` within the window.
pub fn range_query(bucket: &str, start: f64, end: Option<f64>) -> String {
    let stop = end
        .map(|end| format!(", stop: {}", format_time(end)))
        .unwrap_or_default();

    format!(
        "from(bucket: \"{}\")\n  |> range(start: {}{})",
        bucket.replace('\\', "\\\\").replace('"', "\\\""),
        format_time(start),
        stop
    )
}

/// RFC 3339 UTC timestamp for a Unix time in seconds, nanosecond precision.
pub fn format_time(secs: f64) -> String {
    DateTime::from_timestamp_nanos(secs_to_ns(secs)).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
