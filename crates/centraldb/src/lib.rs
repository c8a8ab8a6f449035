// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CentralDB Replication Service
//!
//! Incrementally mirrors time-series data from many remote InfluxDB
//! instances (one per source) into a single central InfluxDB, one bucket
//! per source.
//!
//! # Features
//!
//! - **Durable Cursors** -- Per-source sync position kept in SQLite
//! - **Streaming Extraction** -- Annotated CSV query results decoded lazily
//! - **Chunked Writes** -- Bounded Line Protocol batches per request
//! - **Auto-provisioning** -- Destination buckets created on first sync
//! - **Failure Isolation** -- One broken source never blocks the others
//!
//! # Architecture
//!
//! ```text
//! Replicator
//! +-- SourceLoader      (sources.yaml, reloaded every cycle)
//! +-- CursorStore       (SQLite, tracking.db)
//! +-- Extractor         (Flux query --> RawRecord stream)
//! +-- Provisioner       (bucket lookup / create)
//! +-- ChunkedWriter     (Point stream --> Destination)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use centraldb::{InfluxDestination, InfluxExtractor, Replicator, Settings, SourcesFile, SqliteCursorStore};
//!
//! let settings = Settings::from_env();
//! let client = reqwest::blocking::Client::new();
//! let cursors = SqliteCursorStore::open_dir(&settings.data_dir)?;
//! cursors.initialize()?;
//!
//! let replicator = Replicator::new(
//!     cursors,
//!     InfluxExtractor::new(client.clone()),
//!     InfluxDestination::new(client, settings.destination),
//! );
//! replicator.run(&SourcesFile::new("sources.yaml"))?;
//! ```

pub mod config;
pub mod cursor;
pub mod destination;
pub mod extract;
pub mod flux_csv;
pub mod line_protocol;
pub mod memory;
pub mod provision;
pub mod record;
pub mod retry;
pub mod sync;
pub mod telemetry;
pub mod transform;
pub mod writer;

pub use config::{
    ConfigError, DestinationConfig, Settings, SourceConfig, SourceLoader, SourcesConfig,
    SourcesFile,
};
pub use cursor::{CursorStore, SqliteCursorStore, StoreError};
pub use destination::{Destination, DestinationError, InfluxDestination};
pub use extract::{ExtractError, Extractor, InfluxExtractor, RecordStream};
pub use memory::{MemoryDestination, MemorySource};
pub use provision::Provisioner;
pub use record::{FieldValue, Point, RawRecord};
pub use retry::RetryPolicy;
pub use sync::{CycleReport, Replicator, SourceReport, StopHandle, SyncError, SyncStage};
pub use telemetry::{Device, DeviceKind, TelemetryGenerator};
pub use transform::record_to_point;
pub use writer::{ChunkedWriter, WriteError, WriteSummary};
