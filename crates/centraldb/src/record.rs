// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Records as read from a source and points as written to the destination.

use std::collections::BTreeMap;
use std::fmt;

/// A scalar value stored under an InfluxDB field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit floating point.
    Float(f64),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit unsigned integer.
    UInteger(u64),
    /// UTF-8 string.
    String(String),
    /// Boolean value.
    Boolean(bool),
}

impl FieldValue {
    /// Format this value for InfluxDB Line Protocol.
    ///
    /// - Float: written as-is (e.g., `3.14`)
    /// - Integer: suffixed with `i` (e.g., `42i`)
    /// - UInteger: suffixed with `u` (e.g., `42u`)
    /// - String: quoted with double quotes, inner quotes escaped (e.g., `"hello"`)
    /// - Boolean: `true` or `false`
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) => format!("{}", v),
            FieldValue::Integer(v) => format!("{}i", v),
            FieldValue::UInteger(v) => format!("{}u", v),
            FieldValue::String(v) => {
                let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\"", escaped)
            }
            FieldValue::Boolean(v) => v.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

/// One observation returned by a source query.
///
/// `values` holds every column of the result row, including the
/// store-reserved ones (`_measurement`, `_time`, `table`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Measurement name.
    pub measurement: String,
    /// Field name.
    pub field: String,
    /// Field value.
    pub value: FieldValue,
    /// Timestamp (Unix nanoseconds).
    pub time_ns: i64,
    /// All columns of the row as strings.
    pub values: BTreeMap<String, String>,
}

impl RawRecord {
    /// Build a record with its reserved columns filled in.
    pub fn new(
        measurement: impl Into<String>,
        field: impl Into<String>,
        value: FieldValue,
        time_ns: i64,
    ) -> Self {
        let measurement = measurement.into();
        let field = field.into();

        let mut values = BTreeMap::new();
        values.insert("_measurement".to_string(), measurement.clone());
        values.insert("_field".to_string(), field.clone());
        values.insert("_value".to_string(), value.to_string());
        values.insert("_time".to_string(), time_ns.to_string());
        values.insert("result".to_string(), "_result".to_string());
        values.insert("table".to_string(), "0".to_string());

        Self {
            measurement,
            field,
            value,
            time_ns,
            values,
        }
    }

    /// Attach a metadata column (becomes a tag once transformed).
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

/// Normalized point ready to be written to the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Measurement name.
    pub measurement: String,
    /// Tag set, kept sorted by key.
    pub tags: BTreeMap<String, String>,
    /// Field set.
    pub fields: BTreeMap<String, FieldValue>,
    /// Timestamp (Unix nanoseconds).
    pub time_ns: i64,
}

/// Convert Unix nanoseconds to fractional Unix seconds (cursor unit).
pub fn ns_to_secs(ns: i64) -> f64 {
    let secs = ns.div_euclid(1_000_000_000);
    let nanos = ns.rem_euclid(1_000_000_000);
    secs as f64 + nanos as f64 / 1e9
}

/// Convert fractional Unix seconds to Unix nanoseconds, rounding down.
pub fn secs_to_ns(secs: f64) -> i64 {
    (secs * 1e9).floor() as i64
}

/// Largest cursor value whose window still starts at or before `ns`.
///
/// `ns_to_secs` rounds to the nearest `f64`, which can land just after `ns`;
/// stepping down keeps the record at `ns` inside the next window.
pub fn cursor_for_ns(ns: i64) -> f64 {
    let mut secs = ns_to_secs(ns);
    while secs_to_ns(secs) > ns {
        secs = next_down(secs);
    }
    secs
}

fn next_down(x: f64) -> f64 {
    if x > 0.0 {
        f64::from_bits(x.to_bits() - 1)
    } else if x < 0.0 {
        f64::from_bits(x.to_bits() + 1)
    } else {
        -f64::from_bits(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_line_protocol() {
        assert_eq!(FieldValue::Float(3.15).to_line_protocol(), "3.15");
        assert_eq!(FieldValue::Integer(42).to_line_protocol(), "42i");
        assert_eq!(FieldValue::UInteger(7).to_line_protocol(), "7u");
        assert_eq!(FieldValue::Boolean(false).to_line_protocol(), "false");
        assert_eq!(
            FieldValue::String("say \"hi\"".to_string()).to_line_protocol(),
            "\"say \\\"hi\\\"\""
        );
    }

    #[test]
    fn test_raw_record_carries_reserved_columns() {
        let record = RawRecord::new("pressure", "pressure", FieldValue::Float(1.5), 10)
            .with_value("sensor", "p1");

        assert_eq!(record.values["_measurement"], "pressure");
        assert_eq!(record.values["_field"], "pressure");
        assert_eq!(record.values["sensor"], "p1");
    }

    #[test]
    fn test_time_conversions() {
        assert_eq!(ns_to_secs(2_000_000_000_000), 2000.0);
        assert_eq!(secs_to_ns(2000.0), 2_000_000_000_000);
        assert_eq!(ns_to_secs(1_500_000_000), 1.5);
        assert_eq!(ns_to_secs(-500_000_000), -0.5);
    }

    #[test]
    fn test_cursor_never_passes_record() {
        for k in 0..200i64 {
            let ns = 1_704_067_210_000_000_000 + k * 7_919_333 + 123;
            let cursor = cursor_for_ns(ns);
            let start = secs_to_ns(cursor);
            assert!(start <= ns, "cursor {} starts at {} after {}", cursor, start, ns);
            assert!(ns - start < 1_000, "cursor {} too far behind {}", cursor, ns);
        }
        assert_eq!(cursor_for_ns(2_000_000_000_000), 2000.0);
        assert_eq!(cursor_for_ns(0), 0.0);
    }
}
