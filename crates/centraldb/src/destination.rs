// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Destination store access
//!
//! The central store receives one bucket per source. Implementations of
//! [`Destination`] are created once at start-up and shared by every sync.

use crate::config::DestinationConfig;
use crate::line_protocol::encode_batch;
use crate::record::Point;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Mutex;
use thiserror::Error;

/// Destination errors.
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request rejected with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("organization '{0}' not found")]
    OrgNotFound(String),

    #[error("bucket '{0}' still missing after creation was attempted")]
    BucketMissing(String),

    #[error("destination unavailable: {0}")]
    Unavailable(String),
}

impl DestinationError {
    /// Returns true for failures worth retrying (transport, 5xx, 429).
    pub fn is_transient(&self) -> bool {
        match self {
            DestinationError::Http(e) => !e.is_decode() && !e.is_builder(),
            DestinationError::Status { status, .. } => *status >= 500 || *status == 429,
            DestinationError::Unavailable(_) => true,
            DestinationError::OrgNotFound(_) | DestinationError::BucketMissing(_) => false,
        }
    }
}

/// Central store operations needed by the replicator.
pub trait Destination {
    /// Returns true if a bucket with this name exists.
    fn bucket_exists(&self, bucket: &str) -> Result<bool, DestinationError>;

    /// Create a bucket (infinite retention).
    fn create_bucket(&self, bucket: &str) -> Result<(), DestinationError>;

    /// Write a batch of points in a single request.
    fn write_points(&self, bucket: &str, points: &[Point]) -> Result<(), DestinationError>;
}

#[derive(Debug, Deserialize)]
struct BucketList {
    #[serde(default)]
    buckets: Vec<NamedResource>,
}

#[derive(Debug, Deserialize)]
struct OrgList {
    #[serde(default)]
    orgs: Vec<NamedResource>,
}

#[derive(Debug, Deserialize)]
struct NamedResource {
    id: String,
    name: String,
}

/// InfluxDB v2 destination over HTTP.
#[derive(Debug)]
pub struct InfluxDestination {
    client: Client,
    config: DestinationConfig,
    org_id: Mutex<Option<String>>,
}

impl InfluxDestination {
    pub fn new(client: Client, config: DestinationConfig) -> Self {
        Self {
            client,
            config,
            org_id: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DestinationConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn auth(&self) -> String {
        format!("Token {}", self.config.token)
    }

    /// Organization id for the configured organization name (cached).
    fn org_id(&self) -> Result<String, DestinationError> {
        let mut cached = match self.org_id.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let response = self
            .client
            .get(self.endpoint("/api/v2/orgs"))
            .query(&[("org", self.config.org.as_str())])
            .header("Authorization", self.auth())
            .send()?;
        let orgs: OrgList = check(response)?.json()?;

        let id = orgs
            .orgs
            .into_iter()
            .find(|o| o.name == self.config.org)
            .map(|o| o.id)
            .ok_or_else(|| DestinationError::OrgNotFound(self.config.org.clone()))?;

        *cached = Some(id.clone());
        Ok(id)
    }
}

impl Destination for InfluxDestination {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, DestinationError> {
        let response = self
            .client
            .get(self.endpoint("/api/v2/buckets"))
            .query(&[("name", bucket), ("org", self.config.org.as_str())])
            .header("Authorization", self.auth())
            .send()?;

        // Unknown org/bucket combinations answer 404 on some versions.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }

        let list: BucketList = check(response)?.json()?;
        Ok(list.buckets.iter().any(|b| b.name == bucket))
    }

    fn create_bucket(&self, bucket: &str) -> Result<(), DestinationError> {
        let org_id = self.org_id()?;

        let response = self
            .client
            .post(self.endpoint("/api/v2/buckets"))
            .header("Authorization", self.auth())
            .json(&json!({
                "orgID": org_id,
                "name": bucket,
                "retentionRules": [],
            }))
            .send()?;
        check(response)?;

        tracing::info!(bucket, "Created destination bucket");
        Ok(())
    }

    fn write_points(&self, bucket: &str, points: &[Point]) -> Result<(), DestinationError> {
        let response = self
            .client
            .post(self.endpoint("/api/v2/write"))
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", bucket),
                ("precision", "ns"),
            ])
            .header("Authorization", self.auth())
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(encode_batch(points))
            .send()?;
        check(response)?;
        Ok(())
    }
}

fn check(response: Response) -> Result<Response, DestinationError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(DestinationError::Status {
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        })
    }
}
