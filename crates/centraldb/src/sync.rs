// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Replication control loop
//!
//! For every configured source, in order:
//!
//! ```text
//! cursor.get --> Extractor --> record_to_point --> ChunkedWriter --> cursor.set
//!                    |                                  |
//!                    +---- Provisioner (bucket) --------+
//! ```
//!
//! The cursor only moves after every chunk of the window was written, so a
//! failure anywhere before the commit makes the next cycle re-read the same
//! window (at-least-once delivery). Failures are contained to the source
//! they happened on.

use crate::config::{ConfigError, SourceConfig, SourceLoader};
use crate::cursor::{CursorStore, StoreError};
use crate::destination::{Destination, DestinationError};
use crate::extract::{ExtractError, Extractor};
use crate::provision::Provisioner;
use crate::record::cursor_for_ns;
use crate::transform::record_to_point;
use crate::writer::{ChunkedWriter, WriteError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Granularity of the interruptible sleep between cycles.
const STOP_POLL: Duration = Duration::from_millis(100);

/// Stage of a single source sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Idle,
    Extracting,
    Provisioning,
    Writing,
    Committing,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStage::Idle => "reading cursor",
            SyncStage::Extracting => "extracting",
            SyncStage::Provisioning => "provisioning",
            SyncStage::Writing => "writing",
            SyncStage::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// Underlying cause of an aborted source sync.
#[derive(Debug, Error)]
pub enum SyncFailure {
    #[error(transparent)]
    Cursor(#[from] StoreError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Write(#[from] DestinationError),
}

/// A source sync that was aborted; the source's cursor is unchanged.
#[derive(Debug, Error)]
#[error("sync of '{source_name}' aborted while {stage}: {failure}")]
pub struct SyncError {
    pub source_name: String,
    pub stage: SyncStage,
    #[source]
    pub failure: SyncFailure,
}

/// Outcome of a successful source sync.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    /// Source name.
    pub source: String,
    /// Window start (cursor value before the sync).
    pub start: f64,
    /// Window end, if bounded.
    pub end: Option<f64>,
    /// Points written.
    pub points: usize,
    /// Write requests issued.
    pub batches: usize,
    /// New cursor value, if it was committed.
    pub committed: Option<f64>,
    /// Whether the destination bucket was confirmed before writing.
    pub provisioned: bool,
}

/// Outcome of one pass over all sources.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub synced: Vec<SourceReport>,
    pub failed: Vec<SyncError>,
}

impl CycleReport {
    /// Total points written during the cycle.
    pub fn points(&self) -> usize {
        self.synced.iter().map(|r| r.points).sum()
    }

    /// Returns true if no source failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Handle to stop a running replicator from another thread.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Stop after the current source / sleep slice.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Incremental replicator.
///
/// # Type Parameters
///
/// - `C` -- Cursor store (e.g., `SqliteCursorStore`)
/// - `X` -- Source extractor (e.g., `InfluxExtractor`)
/// - `D` -- Destination (e.g., `InfluxDestination`)
pub struct Replicator<C, X, D> {
    cursors: C,
    extractor: X,
    destination: D,
    provisioner: Provisioner,
    writer: ChunkedWriter,
    until: Option<f64>,
    running: Arc<AtomicBool>,
}

impl<C: CursorStore, X: Extractor, D: Destination> Replicator<C, X, D> {
    /// Create a replicator with default provisioning and chunking.
    pub fn new(cursors: C, extractor: X, destination: D) -> Self {
        Self {
            cursors,
            extractor,
            destination,
            provisioner: Provisioner::default(),
            writer: ChunkedWriter::default(),
            until: None,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_provisioner(mut self, provisioner: Provisioner) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn with_writer(mut self, writer: ChunkedWriter) -> Self {
        self.writer = writer;
        self
    }

    /// Bound every window at `until` (Unix seconds) and commit that value.
    pub fn with_until(mut self, until: Option<f64>) -> Self {
        self.until = until;
        self
    }

    pub fn cursors(&self) -> &C {
        &self.cursors
    }

    pub fn extractor(&self) -> &X {
        &self.extractor
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Check if the replicator is still allowed to run.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get a handle to stop the replicator from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
        }
    }

    /// Replicate one source from its cursor onwards.
    pub fn sync_source(&self, source: &SourceConfig) -> Result<SourceReport, SyncError> {
        let abort = |stage: SyncStage, failure: SyncFailure| SyncError {
            source_name: source.name.clone(),
            stage,
            failure,
        };

        let start = self
            .cursors
            .get(&source.name)
            .map_err(|e| abort(SyncStage::Idle, e.into()))?;

        if let Some(until) = self.until {
            if until <= start {
                tracing::debug!(source = %source.name, cursor = start, "Already synced past window end");
                return Ok(SourceReport {
                    source: source.name.clone(),
                    start,
                    end: Some(until),
                    points: 0,
                    batches: 0,
                    committed: None,
                    provisioned: false,
                });
            }
        }
        let end = self.until;

        tracing::debug!(source = %source.name, start, end = ?end, "{}", SyncStage::Extracting);
        let records = self
            .extractor
            .query(source, start, end)
            .map_err(|e| abort(SyncStage::Extracting, e.into()))?;

        tracing::debug!(source = %source.name, "{}", SyncStage::Provisioning);
        let provisioned = self.provisioner.ensure_exists(&self.destination, &source.name);
        if !provisioned {
            tracing::warn!(source = %source.name, "Bucket not confirmed, attempting write anyway");
        }

        tracing::debug!(source = %source.name, "{}", SyncStage::Writing);
        let points = records.map(|record| record.map(|r| record_to_point(&r)));
        let summary = self
            .writer
            .write_all(&self.destination, &source.name, points)
            .map_err(|e| match e {
                WriteError::Source(e) => abort(SyncStage::Extracting, e.into()),
                WriteError::Destination(e) => abort(SyncStage::Writing, e.into()),
            })?;

        let committed = end
            .or_else(|| summary.max_time_ns.map(cursor_for_ns))
            .map(|t| t.max(start));

        if let Some(cursor) = committed {
            tracing::debug!(source = %source.name, cursor, "{}", SyncStage::Committing);
            self.cursors
                .set(&source.name, cursor)
                .map_err(|e| abort(SyncStage::Committing, e.into()))?;
        }

        Ok(SourceReport {
            source: source.name.clone(),
            start,
            end,
            points: summary.points,
            batches: summary.batches,
            committed,
            provisioned,
        })
    }

    /// Sync every source in order; a failing source never stops the others.
    pub fn run_cycle(&self, sources: &[SourceConfig]) -> CycleReport {
        let mut report = CycleReport::default();

        for source in sources {
            if !self.is_running() {
                break;
            }

            match self.sync_source(source) {
                Ok(source_report) => {
                    tracing::info!(
                        source = %source.name,
                        points = source_report.points,
                        batches = source_report.batches,
                        cursor = ?source_report.committed,
                        "Source synced"
                    );
                    report.synced.push(source_report);
                }
                Err(e) => {
                    tracing::warn!(source = %source.name, stage = %e.stage, "Source skipped: {}", e.failure);
                    report.failed.push(e);
                }
            }
        }

        report
    }

    /// Run cycles until stopped.
    ///
    /// The source list is reloaded before every cycle. Only the first load
    /// is fatal; later load failures keep the previous list for that cycle.
    pub fn run<L: SourceLoader + ?Sized>(&self, loader: &L) -> Result<(), ConfigError> {
        let mut config = loader.load()?;

        tracing::info!(
            sources = config.sources.len(),
            interval_secs = config.interval,
            "Starting replication"
        );

        while self.is_running() {
            let started = Instant::now();
            let report = self.run_cycle(&config.sources);

            tracing::info!(
                synced = report.synced.len(),
                failed = report.failed.len(),
                points = report.points(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Sync cycle complete"
            );

            if !self.sleep(config.interval()) {
                break;
            }

            match loader.load() {
                Ok(next) => config = next,
                Err(e) => {
                    tracing::warn!("Source list reload failed, keeping previous list: {}", e);
                }
            }
        }

        tracing::info!("Replication stopped");
        Ok(())
    }

    /// Sleep for `duration` unless stopped first. Returns false if stopped.
    fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if !self.is_running() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(STOP_POLL.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourcesConfig;
    use crate::cursor::SqliteCursorStore;
    use crate::memory::{MemoryDestination, MemorySource};
    use crate::record::{FieldValue, RawRecord};
    use crate::retry::RetryPolicy;
    use std::cell::Cell;

    type TestReplicator = Replicator<SqliteCursorStore, MemorySource, MemoryDestination>;

    fn source(name: &str) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            url: "mem://".to_string(),
            token: String::new(),
            org: "lab".to_string(),
            bucket: "telemetry".to_string(),
        }
    }

    fn record(secs: i64) -> RawRecord {
        RawRecord::new("pressure", "pressure", FieldValue::Float(secs as f64), secs * 1_000_000_000)
            .with_value("sensor", "p1")
    }

    fn replicator() -> TestReplicator {
        let cursors = SqliteCursorStore::new_in_memory().unwrap();
        cursors.initialize().unwrap();
        Replicator::new(cursors, MemorySource::new(), MemoryDestination::new())
            .with_provisioner(Provisioner::new(RetryPolicy::immediate(5)))
    }

    #[test]
    fn test_sync_commits_max_record_time() {
        let rep = replicator().with_writer(ChunkedWriter::new(4));
        rep.extractor().push("a", (10..20).map(record));

        let report = rep.sync_source(&source("a")).unwrap();

        assert_eq!(report.start, 0.0);
        assert_eq!(report.points, 10);
        assert_eq!(report.batches, 3);
        assert_eq!(report.committed, Some(19.0));
        assert!(report.provisioned);
        assert_eq!(rep.cursors().get("a").unwrap(), 19.0);
        assert!(rep.destination().has_bucket("a"));

        let first = &rep.destination().points("a")[0];
        assert_eq!(first.tags["sensor"], "p1");
        assert!(!first.tags.contains_key("_measurement"));
    }

    #[test]
    fn test_sync_resumes_from_cursor_inclusive() {
        let rep = replicator();
        rep.extractor().push("a", (1..=3).map(record));
        rep.sync_source(&source("a")).unwrap();

        rep.extractor().push("a", (4..=6).map(record));
        let report = rep.sync_source(&source("a")).unwrap();

        assert_eq!(report.start, 3.0);
        // Boundary record at t=3 is delivered again.
        assert_eq!(report.points, 4);
        assert_eq!(rep.cursors().get("a").unwrap(), 6.0);
        assert_eq!(rep.extractor().queries()[1].start, 3.0);
    }

    #[test]
    fn test_sub_second_boundary_record_is_delivered_again() {
        let rep = replicator();
        for k in 0..50i64 {
            let ns = 1_704_067_210_000_000_000 + k * 7_919_333 + 123;
            let name = format!("s{}", k);
            rep.extractor().push(
                &name,
                [RawRecord::new("pump", "active", FieldValue::Boolean(true), ns)],
            );

            let first = rep.sync_source(&source(&name)).unwrap();
            assert_eq!(first.points, 1);
            let again = rep.sync_source(&source(&name)).unwrap();
            assert_eq!(again.points, 1, "record at {} skipped after commit", ns);
        }
    }

    #[test]
    fn test_empty_window_leaves_cursor() {
        let rep = replicator();
        rep.cursors().set("a", 50.0).unwrap();

        let report = rep.sync_source(&source("a")).unwrap();

        assert_eq!(report.committed, None);
        assert_eq!(report.batches, 0);
        assert_eq!(rep.cursors().get("a").unwrap(), 50.0);
    }

    #[test]
    fn test_write_failure_keeps_cursor() {
        let rep = replicator();
        rep.cursors().set("a", 5.0).unwrap();
        rep.extractor().push("a", (5..10).map(record));
        rep.destination().fail_writes_to("a");

        let err = rep.sync_source(&source("a")).unwrap_err();

        assert_eq!(err.stage, SyncStage::Writing);
        assert!(matches!(err.failure, SyncFailure::Write(_)));
        assert_eq!(rep.cursors().get("a").unwrap(), 5.0);
    }

    #[test]
    fn test_extract_failure_keeps_cursor_and_skips_provisioning() {
        let rep = replicator();
        rep.extractor().fail_queries("a");

        let err = rep.sync_source(&source("a")).unwrap_err();

        assert_eq!(err.stage, SyncStage::Extracting);
        assert_eq!(rep.destination().lookup_calls(), 0);
        assert_eq!(rep.cursors().get("a").unwrap(), 0.0);
    }

    #[test]
    fn test_provisioning_failure_still_attempts_write() {
        let rep = replicator();
        rep.extractor().push("a", (1..=2).map(record));
        rep.destination().fail_next_lookups(5);

        let report = rep.sync_source(&source("a")).unwrap();

        assert!(!report.provisioned);
        assert_eq!(rep.destination().batch_sizes("a"), vec![2]);
        assert_eq!(rep.cursors().get("a").unwrap(), 2.0);
    }

    #[test]
    fn test_until_bounds_window_and_commits_end() {
        let rep = replicator().with_until(Some(15.0));
        rep.extractor().push("a", (10..20).map(record));

        let report = rep.sync_source(&source("a")).unwrap();

        assert_eq!(report.points, 5);
        assert_eq!(report.committed, Some(15.0));
        assert_eq!(rep.extractor().queries()[0].end, Some(15.0));

        // Nothing left below the bound.
        let again = rep.sync_source(&source("a")).unwrap();
        assert_eq!(again.points, 0);
        assert_eq!(again.committed, None);
        assert_eq!(rep.extractor().queries().len(), 1);
    }

    #[test]
    fn test_cycle_isolates_failing_source() {
        let rep = replicator();
        rep.extractor().push("a", (1..=3).map(record));
        rep.extractor().push("b", (1..=3).map(record));
        rep.extractor().push("c", (1..=3).map(record));
        rep.destination().fail_writes_to("b");

        let report = rep.run_cycle(&[source("a"), source("b"), source("c")]);

        assert_eq!(report.synced.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].source_name, "b");
        assert_eq!(report.points(), 6);
        assert!(!report.is_clean());
        assert_eq!(rep.cursors().get("a").unwrap(), 3.0);
        assert_eq!(rep.cursors().get("b").unwrap(), 0.0);
        assert_eq!(rep.cursors().get("c").unwrap(), 3.0);
    }

    #[test]
    fn test_run_reloads_sources_and_survives_bad_reload() {
        let rep = replicator();
        rep.extractor().push("a", (1..=3).map(record));
        rep.extractor().push("b", (1..=3).map(record));
        let stop = rep.stop_handle();
        let calls = Cell::new(0);

        let loader = || {
            calls.set(calls.get() + 1);
            match calls.get() {
                1 => Ok(SourcesConfig {
                    sources: vec![source("a")],
                    interval: 0,
                }),
                2 => Err(ConfigError::Invalid("broken file".into())),
                3 => Ok(SourcesConfig {
                    sources: vec![source("a"), source("b")],
                    interval: 0,
                }),
                _ => {
                    stop.stop();
                    Ok(SourcesConfig {
                        sources: vec![],
                        interval: 0,
                    })
                }
            }
        };

        rep.run(&loader).unwrap();

        assert_eq!(calls.get(), 4);
        // "a" ran in cycles 1, 2 (previous list kept) and 3; "b" only in 3.
        let queried: Vec<String> = rep.extractor().queries().into_iter().map(|q| q.source).collect();
        assert_eq!(queried, vec!["a", "a", "a", "b"]);
        assert_eq!(rep.cursors().get("b").unwrap(), 3.0);
    }

    #[test]
    fn test_run_fails_on_first_load() {
        let rep = replicator();
        let loader = || -> Result<SourcesConfig, ConfigError> {
            Err(ConfigError::Invalid("no sources".into()))
        };
        assert!(rep.run(&loader).is_err());
        assert!(rep.extractor().queries().is_empty());
    }

    #[test]
    fn test_stopped_replicator_skips_sources() {
        let rep = replicator();
        rep.stop_handle().stop();
        let report = rep.run_cycle(&[source("a")]);
        assert!(report.synced.is_empty() && report.failed.is_empty());
    }

    #[test]
    fn test_error_display_names_source_and_stage() {
        let rep = replicator();
        rep.extractor().fail_queries("a");
        let err = rep.sync_source(&source("a")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'a'"), "{}", msg);
        assert!(msg.contains("extracting"), "{}", msg);
    }
}
