// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory source and destination
//!
//! Stand-ins for InfluxDB used by tests and dry runs. Both record the calls
//! made against them and can be told to fail.

use crate::config::SourceConfig;
use crate::destination::{Destination, DestinationError};
use crate::extract::{ExtractError, Extractor, RecordStream};
use crate::record::{secs_to_ns, Point, RawRecord};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A query issued against a [`MemorySource`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryLog {
    pub source: String,
    pub start: f64,
    pub end: Option<f64>,
}

/// In-memory source stores keyed by source name.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: Mutex<HashMap<String, Vec<RawRecord>>>,
    failing: Mutex<HashSet<String>>,
    queries: Mutex<Vec<QueryLog>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records to a source.
    pub fn push<I: IntoIterator<Item = RawRecord>>(&self, source: &str, records: I) {
        let mut all = lock(&self.records);
        let entry = all.entry(source.to_string()).or_default();
        entry.extend(records);
        entry.sort_by_key(|r| r.time_ns);
    }

    /// Make every query against `source` fail.
    pub fn fail_queries(&self, source: &str) {
        lock(&self.failing).insert(source.to_string());
    }

    /// Stop failing queries against `source`.
    pub fn heal(&self, source: &str) {
        lock(&self.failing).remove(source);
    }

    /// Queries issued so far.
    pub fn queries(&self) -> Vec<QueryLog> {
        lock(&self.queries).clone()
    }
}

impl Extractor for MemorySource {
    fn query(
        &self,
        source: &SourceConfig,
        start: f64,
        end: Option<f64>,
    ) -> Result<RecordStream<'_>, ExtractError> {
        lock(&self.queries).push(QueryLog {
            source: source.name.clone(),
            start,
            end,
        });

        if lock(&self.failing).contains(&source.name) {
            return Err(ExtractError::Unavailable(source.name.clone()));
        }

        let start_ns = secs_to_ns(start);
        let end_ns = end.map(secs_to_ns);
        let selected: Vec<RawRecord> = lock(&self.records)
            .get(&source.name)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.time_ns >= start_ns && end_ns.map_or(true, |e| r.time_ns < e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(Box::new(selected.into_iter().map(Ok::<RawRecord, ExtractError>)))
    }
}

/// In-memory destination with call accounting.
#[derive(Debug, Default)]
pub struct MemoryDestination {
    buckets: Mutex<BTreeSet<String>>,
    written: Mutex<BTreeMap<String, Vec<Vec<Point>>>>,
    failing_writes: Mutex<HashSet<String>>,
    lookup_failures: Mutex<u32>,
    create_failures: Mutex<u32>,
    lookup_calls: Mutex<u32>,
    create_calls: Mutex<u32>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already existing bucket.
    pub fn add_bucket(&self, bucket: &str) {
        lock(&self.buckets).insert(bucket.to_string());
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        lock(&self.buckets).contains(bucket)
    }

    /// Make every write to `bucket` fail.
    pub fn fail_writes_to(&self, bucket: &str) {
        lock(&self.failing_writes).insert(bucket.to_string());
    }

    /// Make the next `n` bucket lookups fail with a transient error.
    pub fn fail_next_lookups(&self, n: u32) {
        *lock(&self.lookup_failures) = n;
    }

    /// Make the next `n` bucket creations fail with a transient error.
    pub fn fail_next_creates(&self, n: u32) {
        *lock(&self.create_failures) = n;
    }

    pub fn lookup_calls(&self) -> u32 {
        *lock(&self.lookup_calls)
    }

    pub fn create_calls(&self) -> u32 {
        *lock(&self.create_calls)
    }

    /// Size of every batch written to `bucket`, in write order.
    pub fn batch_sizes(&self, bucket: &str) -> Vec<usize> {
        lock(&self.written)
            .get(bucket)
            .map(|batches| batches.iter().map(Vec::len).collect())
            .unwrap_or_default()
    }

    /// Every point written to `bucket`, in write order.
    pub fn points(&self, bucket: &str) -> Vec<Point> {
        lock(&self.written)
            .get(bucket)
            .map(|batches| batches.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }
}

fn take_failure(counter: &Mutex<u32>) -> bool {
    let mut remaining = lock(counter);
    if *remaining > 0 {
        *remaining -= 1;
        true
    } else {
        false
    }
}

impl Destination for MemoryDestination {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, DestinationError> {
        *lock(&self.lookup_calls) += 1;
        if take_failure(&self.lookup_failures) {
            return Err(DestinationError::Unavailable("lookup".into()));
        }
        Ok(self.has_bucket(bucket))
    }

    fn create_bucket(&self, bucket: &str) -> Result<(), DestinationError> {
        *lock(&self.create_calls) += 1;
        if take_failure(&self.create_failures) {
            return Err(DestinationError::Unavailable("create".into()));
        }
        self.add_bucket(bucket);
        Ok(())
    }

    fn write_points(&self, bucket: &str, points: &[Point]) -> Result<(), DestinationError> {
        if lock(&self.failing_writes).contains(bucket) {
            return Err(DestinationError::Status {
                status: 400,
                body: format!("write to '{}' rejected", bucket),
            });
        }
        lock(&self.written)
            .entry(bucket.to_string())
            .or_default()
            .push(points.to_vec());
        Ok(())
    }
}
