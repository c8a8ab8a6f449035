// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Streaming reader for InfluxDB annotated CSV query results.
//!
//! ```text
//! #datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,double,string,string,string
//! #group,false,false,true,true,false,false,true,true,true
//! #default,_result,,,,,,,,
//! ,result,table,_start,_stop,_time,_value,_field,_measurement,sensor
//! ,,0,2024-01-01T00:00:00Z,2024-01-02T00:00:00Z,2024-01-01T00:00:10Z,4.2,temperature,thermometer,t1
//! ```
//!
//! Each annotation block starts a new table with its own header. Rows are
//! decoded one at a time as the underlying reader is consumed.

use crate::extract::ExtractError;
use crate::record::{FieldValue, RawRecord};
use chrono::DateTime;
use std::collections::BTreeMap;
use std::io::Read;

/// Column layout of the table currently being read.
#[derive(Debug, Default)]
struct TableLayout {
    columns: Vec<String>,
    datatypes: Vec<String>,
    defaults: Vec<String>,
    error_table: bool,
}

impl TableLayout {
    fn cell<'a>(&'a self, row: &'a csv::StringRecord, index: usize) -> &'a str {
        match row.get(index) {
            Some(value) if !value.is_empty() => value,
            _ => self.defaults.get(index).map(String::as_str).unwrap_or(""),
        }
    }

    fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// Iterator of records decoded from an annotated CSV stream.
pub struct FluxCsvReader<R: Read> {
    rows: csv::StringRecordsIntoIter<R>,
    pending_datatypes: Vec<String>,
    pending_defaults: Vec<String>,
    table: Option<TableLayout>,
    done: bool,
}

impl<R: Read> FluxCsvReader<R> {
    /// Wrap a reader positioned at the start of a query response.
    pub fn new(reader: R) -> Self {
        let rows = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader)
            .into_records();

        Self {
            rows,
            pending_datatypes: Vec::new(),
            pending_defaults: Vec::new(),
            table: None,
            done: false,
        }
    }

    /// Consume one CSV row; returns a record if the row was a data row.
    fn accept(&mut self, row: csv::StringRecord) -> Option<Result<RawRecord, ExtractError>> {
        let first = row.get(0).unwrap_or("");

        if first.starts_with('#') {
            let values = row.iter().map(str::to_string).collect();
            match first {
                "#datatype" => self.pending_datatypes = values,
                "#default" => self.pending_defaults = values,
                _ => {}
            }
            self.table = None;
            return None;
        }

        let Some(table) = &self.table else {
            let columns: Vec<String> = row.iter().map(str::to_string).collect();
            let error_table = is_error_header(&columns);
            self.table = Some(TableLayout {
                columns,
                datatypes: std::mem::take(&mut self.pending_datatypes),
                defaults: std::mem::take(&mut self.pending_defaults),
                error_table,
            });
            return None;
        };

        if table.error_table {
            let message = table
                .index_of("error")
                .map(|i| table.cell(&row, i).to_string())
                .unwrap_or_default();
            return Some(Err(ExtractError::Query(message)));
        }

        Some(decode_row(table, &row))
    }
}

impl<R: Read> Iterator for FluxCsvReader<R> {
    type Item = Result<RawRecord, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let row = match self.rows.next() {
                Some(Ok(row)) => row,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(ExtractError::Csv(e)));
                }
                None => {
                    self.done = true;
                    return None;
                }
            };

            if let Some(item) = self.accept(row) {
                if item.is_err() {
                    self.done = true;
                }
                return Some(item);
            }
        }
    }
}

/// In-band query errors come as a table headed `,error,reference`; a data
/// table may still carry a tag column named `error`.
fn is_error_header(columns: &[String]) -> bool {
    matches!(columns, [_, error, reference, ..] if error == "error" && reference == "reference")
}

fn decode_row(table: &TableLayout, row: &csv::StringRecord) -> Result<RawRecord, ExtractError> {
    let mut values = BTreeMap::new();
    for (index, column) in table.columns.iter().enumerate() {
        if column.is_empty() {
            continue;
        }
        values.insert(column.clone(), table.cell(row, index).to_string());
    }

    let required = |column: &str| -> Result<String, ExtractError> {
        values
            .get(column)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| ExtractError::Malformed(format!("missing '{}' column", column)))
    };

    let measurement = required("_measurement")?;
    let field = required("_field")?;
    let time = required("_time")?;
    let raw_value = required("_value")?;

    let time_ns = DateTime::parse_from_rfc3339(&time)
        .ok()
        .and_then(|t| t.timestamp_nanos_opt())
        .ok_or_else(|| ExtractError::Malformed(format!("invalid _time '{}'", time)))?;

    let datatype = table
        .index_of("_value")
        .and_then(|i| table.datatypes.get(i))
        .map(String::as_str)
        .unwrap_or("string");
    let value = parse_value(datatype, &raw_value)?;

    Ok(RawRecord {
        measurement,
        field,
        value,
        time_ns,
        values,
    })
}

fn parse_value(datatype: &str, raw: &str) -> Result<FieldValue, ExtractError> {
    let malformed = || ExtractError::Malformed(format!("invalid {} value '{}'", datatype, raw));

    match datatype {
        "double" => raw.parse().map(FieldValue::Float).map_err(|_| malformed()),
        "long" => raw.parse().map(FieldValue::Integer).map_err(|_| malformed()),
        "unsignedLong" => raw.parse().map(FieldValue::UInteger).map_err(|_| malformed()),
        "boolean" => match raw {
            "true" => Ok(FieldValue::Boolean(true)),
            "false" => Ok(FieldValue::Boolean(false)),
            _ => Err(malformed()),
        },
        _ => Ok(FieldValue::String(raw.to_string())),
    }
}
