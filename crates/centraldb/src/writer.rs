// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Chunked writing of point streams.
//!
//! Points are accumulated in a fixed-capacity buffer that is flushed to
//! the destination as soon as it is full, plus once more when the input
//! is exhausted.

use crate::destination::{Destination, DestinationError};
use crate::extract::ExtractError;
use crate::record::Point;
use thiserror::Error;

/// Default number of points per write request.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Errors raised while draining a point stream.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("source stream failed: {0}")]
    Source(#[from] ExtractError),

    #[error("destination write failed: {0}")]
    Destination(#[from] DestinationError),
}

/// Fixed-capacity point buffer.
pub struct BatchBuffer {
    points: Vec<Point>,
    capacity: usize,
}

impl BatchBuffer {
    /// Create a buffer holding at most `capacity` points (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a point.
    ///
    /// Returns `Some(batch)` if the buffer is now full and should be flushed,
    /// or `None` if there is still room.
    pub fn add(&mut self, point: Point) -> Option<Vec<Point>> {
        self.points.push(point);
        if self.points.len() >= self.capacity {
            Some(self.flush())
        } else {
            None
        }
    }

    /// Take all buffered points.
    pub fn flush(&mut self) -> Vec<Point> {
        std::mem::replace(&mut self.points, Vec::with_capacity(self.capacity))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Result of a fully drained point stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Points written.
    pub points: usize,
    /// Write requests issued.
    pub batches: usize,
    /// Latest point timestamp seen (Unix nanoseconds).
    pub max_time_ns: Option<i64>,
}

/// Writes point streams in bounded chunks.
#[derive(Debug, Clone, Copy)]
pub struct ChunkedWriter {
    chunk_size: usize,
}

impl Default for ChunkedWriter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ChunkedWriter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Drain `points` into `bucket`, one write per full chunk and one for
    /// the trailing partial chunk (skipped when empty).
    ///
    /// Stops at the first source or destination error; chunks written
    /// before that point stay written.
    pub fn write_all<D, I>(
        &self,
        destination: &D,
        bucket: &str,
        points: I,
    ) -> Result<WriteSummary, WriteError>
    where
        D: Destination + ?Sized,
        I: IntoIterator<Item = Result<Point, ExtractError>>,
    {
        let mut buffer = BatchBuffer::new(self.chunk_size);
        let mut summary = WriteSummary::default();

        for point in points {
            let point = point?;
            summary.max_time_ns = Some(
                summary
                    .max_time_ns
                    .map_or(point.time_ns, |t| t.max(point.time_ns)),
            );

            if let Some(batch) = buffer.add(point) {
                self.write_batch(destination, bucket, &batch)?;
                summary.points += batch.len();
                summary.batches += 1;
            }
        }

        let tail = buffer.flush();
        if !tail.is_empty() {
            self.write_batch(destination, bucket, &tail)?;
            summary.points += tail.len();
            summary.batches += 1;
        }

        Ok(summary)
    }

    /// Write one chunk with a single request.
    pub fn write_batch<D: Destination + ?Sized>(
        &self,
        destination: &D,
        bucket: &str,
        points: &[Point],
    ) -> Result<(), DestinationError> {
        destination.write_points(bucket, points)?;
        tracing::debug!(bucket, points = points.len(), "Wrote batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDestination;
    use crate::record::FieldValue;
    use std::collections::BTreeMap;

    fn point(ts: i64) -> Point {
        let mut fields = BTreeMap::new();
        fields.insert("value".to_string(), FieldValue::Integer(ts));
        Point {
            measurement: "m".to_string(),
            tags: BTreeMap::new(),
            fields,
            time_ns: ts,
        }
    }

    fn stream(n: i64) -> impl Iterator<Item = Result<Point, ExtractError>> {
        (0..n).map(|i| Ok(point(i)))
    }

    #[test]
    fn test_batch_buffer_returns_batch_when_full() {
        let mut buf = BatchBuffer::new(3);

        assert!(buf.add(point(1)).is_none());
        assert!(buf.add(point(2)).is_none());
        assert_eq!(buf.len(), 2);

        let batch = buf.add(point(3)).expect("full batch");
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].time_ns, 1);
        assert_eq!(batch[2].time_ns, 3);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_chunks_25000_into_three_writes() {
        let dest = MemoryDestination::new();
        let summary = ChunkedWriter::new(10_000)
            .write_all(&dest, "fridge-a", stream(25_000))
            .unwrap();

        assert_eq!(dest.batch_sizes("fridge-a"), vec![10_000, 10_000, 5_000]);
        assert_eq!(summary.points, 25_000);
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.max_time_ns, Some(24_999));
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_write() {
        let dest = MemoryDestination::new();
        ChunkedWriter::new(5)
            .write_all(&dest, "b", stream(10))
            .unwrap();
        assert_eq!(dest.batch_sizes("b"), vec![5, 5]);
    }

    #[test]
    fn test_empty_stream_issues_no_write() {
        let dest = MemoryDestination::new();
        let summary = ChunkedWriter::default()
            .write_all(&dest, "b", stream(0))
            .unwrap();

        assert_eq!(summary, WriteSummary::default());
        assert!(dest.batch_sizes("b").is_empty());
    }

    #[test]
    fn test_order_preserved_across_chunks() {
        let dest = MemoryDestination::new();
        ChunkedWriter::new(4)
            .write_all(&dest, "b", stream(10))
            .unwrap();

        let times: Vec<i64> = dest.points("b").iter().map(|p| p.time_ns).collect();
        assert_eq!(times, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_source_error_stops_without_flushing_tail() {
        let dest = MemoryDestination::new();
        let points = stream(7).chain(std::iter::once(Err(ExtractError::Query("boom".into()))));

        let result = ChunkedWriter::new(5).write_all(&dest, "b", points);

        assert!(matches!(result, Err(WriteError::Source(_))));
        assert_eq!(dest.batch_sizes("b"), vec![5]);
    }

    #[test]
    fn test_destination_error_propagates() {
        let dest = MemoryDestination::new();
        dest.fail_writes_to("b");

        let result = ChunkedWriter::new(5).write_all(&dest, "b", stream(3));
        assert!(matches!(result, Err(WriteError::Destination(_))));
    }
}
