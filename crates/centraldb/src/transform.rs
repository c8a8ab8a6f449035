// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Source record to destination point mapping.

use crate::record::{Point, RawRecord};
use std::collections::BTreeMap;

/// Columns produced by the source store itself; never copied as tags.
pub const RESERVED_COLUMNS: [&str; 8] = [
    "_measurement",
    "_field",
    "_value",
    "_time",
    "result",
    "table",
    "_start",
    "_stop",
];

/// Returns true if `key` is a store-reserved column.
pub fn is_reserved(key: &str) -> bool {
    RESERVED_COLUMNS.contains(&key)
}

/// Map a source record to a point.
///
/// Measurement and timestamp are copied verbatim, the record's single
/// field becomes the point's only field, and every non-reserved column
/// becomes a tag.
pub fn record_to_point(record: &RawRecord) -> Point {
    let tags = record
        .values
        .iter()
        .filter(|(key, _)| !is_reserved(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let mut fields = BTreeMap::new();
    fields.insert(record.field.clone(), record.value.clone());

    Point {
        measurement: record.measurement.clone(),
        tags,
        fields,
        time_ns: record.time_ns,
    }
}
