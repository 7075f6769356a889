// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Columnar record encoder for the binary (RPC) transport.
//!
//! Points sharing a measurement are turned into one [`Record`]: a schema
//! inferred from the batch, one [`ColumnValues`] per schema entry, and a
//! trailing `time` column.
//!
//! ```text
//! Point[] --extract_schema--> FieldSchemaEntry[]
//!         --extract_columns-> ColumnValues[] (+ time column)
//!         --marshal---------> bytes
//! ```
//!
//! Schema inference is first-seen-wins: a later point supplying a value of a
//! different type for the same name gets a null in that row. Tags and fields
//! are separate namespaces, so a key used as both yields a `Tag` column and a
//! field column of the same name.
//!
//! Encoding a batch never fails on a single bad row: a point whose timestamp
//! cannot be scaled to nanoseconds is skipped and logged.

mod codec;
mod colval;

pub use colval::ColumnValues;

use std::borrow::Cow;
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::EncodingError;
use crate::point::{Point, Value};

/// Name of the trailing timestamp column.
pub const TIME_COLUMN: &str = "time";

/// Column type in a record schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int64,
    Float64,
    Bool,
    String,
    Tag,
}

impl ColumnType {
    /// Column type a field value maps to.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Int(_) => ColumnType::Int64,
            Value::Float(_) => ColumnType::Float64,
            Value::Bool(_) => ColumnType::Bool,
            Value::String(_) => ColumnType::String,
        }
    }

    /// Wire type id understood by the server's record decoder.
    pub fn type_id(self) -> i64 {
        match self {
            ColumnType::Int64 => 1,
            ColumnType::Float64 => 3,
            ColumnType::String => 4,
            ColumnType::Bool => 5,
            ColumnType::Tag => 6,
        }
    }

    pub fn from_type_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(ColumnType::Int64),
            3 => Some(ColumnType::Float64),
            4 => Some(ColumnType::String),
            5 => Some(ColumnType::Bool),
            6 => Some(ColumnType::Tag),
            _ => None,
        }
    }
}

/// One schema entry: column name and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchemaEntry {
    pub name: String,
    pub column_type: ColumnType,
}

impl FieldSchemaEntry {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Infer the schema of a batch: tags as [`ColumnType::Tag`], fields by value
/// type, first seen wins, discovery order preserved.
pub fn extract_schema(points: &[Point]) -> Vec<FieldSchemaEntry> {
    let mut tags_seen: HashSet<&str> = HashSet::new();
    let mut fields_seen: HashSet<&str> = HashSet::new();
    let mut schema = Vec::new();

    for point in points {
        for (key, _) in point.tags() {
            if tags_seen.insert(key.as_str()) {
                schema.push(FieldSchemaEntry::new(key.as_str(), ColumnType::Tag));
            }
        }
        for (key, value) in point.fields() {
            if fields_seen.insert(key.as_str()) {
                schema.push(FieldSchemaEntry::new(key.as_str(), ColumnType::of(value)));
            }
        }
    }

    schema
}

/// Build one column per schema entry. Rows whose value is missing or does not
/// coerce to the column type are null; this never fails.
pub fn extract_columns(points: &[Point], schema: &[FieldSchemaEntry]) -> Vec<ColumnValues> {
    schema
        .iter()
        .map(|entry| {
            let mut col = ColumnValues::new();
            let mut mismatched = 0usize;
            for point in points {
                if !append_value(&mut col, entry, point) {
                    mismatched += 1;
                }
            }
            if mismatched > 0 {
                log::debug!(
                    "[record] column '{}' ({:?}): {} value(s) of another type stored as null",
                    entry.name,
                    entry.column_type,
                    mismatched
                );
            }
            col
        })
        .collect()
}

/// Append one row. Returns `false` when a present value was dropped because
/// its type does not match the column.
fn append_value(col: &mut ColumnValues, entry: &FieldSchemaEntry, point: &Point) -> bool {
    if entry.column_type == ColumnType::Tag {
        match point.tag(&entry.name) {
            Some(v) => col.append_str(v),
            None => col.append_str_null(),
        }
        return true;
    }

    let value = point.field(&entry.name);
    match (entry.column_type, value) {
        (ColumnType::Int64, Some(Value::Int(v))) => col.append_int(*v),
        (ColumnType::Float64, Some(Value::Float(v))) => col.append_float(*v),
        (ColumnType::Float64, Some(Value::Int(v))) => col.append_float(*v as f64),
        (ColumnType::Bool, Some(Value::Bool(v))) => col.append_bool(*v),
        (ColumnType::String, Some(Value::String(v))) => col.append_str(v),
        (column_type, value) => {
            if column_type == ColumnType::String {
                col.append_str_null();
            } else {
                col.append_null();
            }
            return value.is_none();
        }
    }
    true
}

/// Binary columnar batch of points sharing one measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    measurement: String,
    schema: Vec<FieldSchemaEntry>,
    columns: Vec<ColumnValues>,
    min_time: i64,
    max_time: i64,
}

impl Record {
    /// Encode points that all belong to one measurement.
    ///
    /// The measurement of the first point names the record; use
    /// [`build_records`] for mixed input. Rows whose timestamp overflows are
    /// skipped; the call fails only when the measurement is empty or no row
    /// is left.
    pub fn from_points(points: &[Point]) -> Result<Self, EncodingError> {
        let measurement = points
            .first()
            .map(|p| p.measurement().to_string())
            .unwrap_or_default();
        if measurement.is_empty() {
            return Err(EncodingError::EmptyMeasurement);
        }

        let now = now_nanos();
        let mut times = Vec::with_capacity(points.len());
        let mut first_err = None;
        for point in points {
            match point.time_nanos() {
                Ok(ts) => times.push(Some(ts.unwrap_or(now))),
                Err(e) => {
                    log::warn!("[record] '{}': skipping row: {}", measurement, e);
                    times.push(None);
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        let rows: Cow<'_, [Point]> = if first_err.is_none() {
            Cow::Borrowed(points)
        } else {
            Cow::Owned(
                points
                    .iter()
                    .zip(&times)
                    .filter(|(_, ts)| ts.is_some())
                    .map(|(p, _)| p.clone())
                    .collect(),
            )
        };
        if rows.is_empty() {
            if let Some(err) = first_err {
                return Err(err);
            }
        }

        let mut schema = extract_schema(&rows);
        let mut columns = extract_columns(&rows, &schema);

        let mut time_col = ColumnValues::new();
        let mut min_time = i64::MAX;
        let mut max_time = i64::MIN;
        for ts in times.into_iter().flatten() {
            min_time = min_time.min(ts);
            max_time = max_time.max(ts);
            time_col.append_int(ts);
        }
        schema.push(FieldSchemaEntry::new(TIME_COLUMN, ColumnType::Int64));
        columns.push(time_col);

        Ok(Self {
            measurement,
            schema,
            columns,
            min_time,
            max_time,
        })
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Schema entries, the trailing `time` column included.
    pub fn schema(&self) -> &[FieldSchemaEntry] {
        &self.schema
    }

    pub fn columns(&self) -> &[ColumnValues] {
        &self.columns
    }

    /// First column named `name`. A tag shadows a field of the same name;
    /// use [`column_of`](Self::column_of) to pick one.
    pub fn column(&self, name: &str) -> Option<&ColumnValues> {
        self.schema
            .iter()
            .position(|e| e.name == name)
            .and_then(|i| self.columns.get(i))
    }

    /// Column by name and type.
    pub fn column_of(&self, name: &str, column_type: ColumnType) -> Option<&ColumnValues> {
        self.schema
            .iter()
            .position(|e| e.name == name && e.column_type == column_type)
            .and_then(|i| self.columns.get(i))
    }

    pub fn row_count(&self) -> usize {
        self.columns.last().map_or(0, ColumnValues::len)
    }

    pub fn min_time(&self) -> i64 {
        self.min_time
    }

    pub fn max_time(&self) -> i64 {
        self.max_time
    }
}

/// Split points by measurement (first appearance order) and encode one
/// [`Record`] per measurement.
///
/// Bad rows never fail the batch: points with an empty measurement and rows
/// with an overflowing timestamp are skipped and logged, so the result may
/// hold fewer rows than `points` (or no record at all).
pub fn build_records(points: &[Point]) -> Vec<Record> {
    let mut groups: Vec<(&str, Vec<Point>)> = Vec::new();
    for point in points {
        match groups.iter_mut().find(|(m, _)| *m == point.measurement()) {
            Some((_, group)) => group.push(point.clone()),
            None => groups.push((point.measurement(), vec![point.clone()])),
        }
    }

    groups
        .iter()
        .filter_map(|(measurement, group)| match Record::from_points(group) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!(
                    "[record] skipping {} point(s) of '{}': {}",
                    group.len(),
                    measurement,
                    e
                );
                None
            }
        })
        .collect()
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
