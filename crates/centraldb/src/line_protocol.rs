// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB v2 Line Protocol encoding for write requests.
//!
//! Line Protocol format:
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```
//!
//! See: <https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/>

use crate::record::Point;

/// Encode a batch of points as a newline-separated write body.
pub fn encode_batch(points: &[Point]) -> String {
    let mut body = String::with_capacity(points.len() * 64);
    for point in points {
        if let Some(line) = encode_point(point) {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(&line);
        }
    }
    body
}

/// Encode a single point.
///
/// Tags are emitted sorted by key. Tags Line Protocol cannot carry (empty
/// value, line breaks, trailing backslash) are dropped so one bad tag does
/// not corrupt the whole write body. Returns `None` for a point without
/// fields.
pub fn encode_point(point: &Point) -> Option<String> {
    if point.fields.is_empty() {
        return None;
    }

    let mut line = escape_measurement(&point.measurement);

    for (key, value) in &point.tags {
        if !tag_encodable(key) || !tag_encodable(value) {
            continue;
        }
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    line.push(' ');

    for (i, (key, value)) in point.fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&value.to_line_protocol());
    }

    line.push(' ');
    line.push_str(&point.time_ns.to_string());

    Some(line)
}

fn tag_encodable(s: &str) -> bool {
    !s.is_empty() && !s.contains(['\n', '\r']) && !s.ends_with('\\')
}

/// Spaces and commas must be escaped with backslash.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys, tag values and field keys share the same rules:
/// commas, equals signs, and spaces must be escaped.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;
    use std::collections::BTreeMap;

    fn point(measurement: &str, tags: &[(&str, &str)], field: (&str, FieldValue), ts: i64) -> Point {
        let mut fields = BTreeMap::new();
        fields.insert(field.0.to_string(), field.1);
        Point {
            measurement: measurement.to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            fields,
            time_ns: ts,
        }
    }

    #[test]
    fn test_line_protocol_simple_point() {
        let p = point("temperature", &[], ("value", FieldValue::Float(23.5)), 1_000_000_000);
        assert_eq!(
            encode_point(&p).as_deref(),
            Some("temperature value=23.5 1000000000")
        );
    }

    #[test]
    fn test_line_protocol_tags_sorted() {
        let p = point(
            "temperature",
            &[("sensor", "A1"), ("location", "room1")],
            ("value", FieldValue::Float(23.5)),
            1_000_000_000,
        );
        assert_eq!(
            encode_point(&p).as_deref(),
            Some("temperature,location=room1,sensor=A1 value=23.5 1000000000")
        );
    }

    #[test]
    fn test_line_protocol_escape_special_chars() {
        let p = point(
            "my measurement",
            &[("tag key", "tag,value")],
            ("field=key", FieldValue::String("hello \"world\"".to_string())),
            3_000_000_000,
        );
        assert_eq!(
            encode_point(&p).as_deref(),
            Some("my\\ measurement,tag\\ key=tag\\,value field\\=key=\"hello \\\"world\\\"\" 3000000000")
        );
    }

    #[test]
    fn test_line_protocol_drops_empty_tag_values() {
        let p = point(
            "pump",
            &[("device", "pump1"), ("zone", "")],
            ("active", FieldValue::Boolean(true)),
            5,
        );
        assert_eq!(encode_point(&p).as_deref(), Some("pump,device=pump1 active=true 5"));
    }

    #[test]
    fn test_line_protocol_drops_unencodable_tags() {
        let p = point(
            "pump",
            &[
                ("device", "pump1"),
                ("note", "line\nbreak"),
                ("path", "C:\\"),
                ("bad\rkey", "x"),
            ],
            ("active", FieldValue::Boolean(true)),
            5,
        );
        assert_eq!(encode_point(&p).as_deref(), Some("pump,device=pump1 active=true 5"));

        let body = encode_batch(&[p.clone(), p]);
        assert_eq!(body.lines().count(), 2);
    }

    #[test]
    fn test_line_protocol_no_fields() {
        let mut p = point("m", &[], ("f", FieldValue::Integer(1)), 1);
        p.fields.clear();
        assert!(encode_point(&p).is_none());
    }

    #[test]
    fn test_encode_batch_joins_lines() {
        let points = vec![
            point("m", &[], ("f", FieldValue::Integer(1)), 1),
            point("m", &[], ("f", FieldValue::Integer(2)), 2),
        ];
        assert_eq!(encode_batch(&points), "m f=1i 1\nm f=2i 2");
        assert_eq!(encode_batch(&[]), "");
    }
}
