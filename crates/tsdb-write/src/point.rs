// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Point data model.
//!
//! A [`Point`] is one measurement sample: a measurement name, ordered tags,
//! ordered typed fields and an optional timestamp. Tags and fields keep the
//! order in which they were inserted; both encoders emit them in that order.

use std::fmt;

use crate::error::EncodingError;

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// UTF-8 string.
    String(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Unit of [`Point::time`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Precision {
    #[default]
    Nanosecond,
    Microsecond,
    Millisecond,
    Second,
    Minute,
    Hour,
}

impl Precision {
    /// Nanoseconds per unit.
    pub fn nanos_per_unit(self) -> i64 {
        match self {
            Precision::Nanosecond => 1,
            Precision::Microsecond => 1_000,
            Precision::Millisecond => 1_000_000,
            Precision::Second => 1_000_000_000,
            Precision::Minute => 60_000_000_000,
            Precision::Hour => 3_600_000_000_000,
        }
    }

    /// Short name used by the server's `precision` request parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::Nanosecond => "ns",
            Precision::Microsecond => "u",
            Precision::Millisecond => "ms",
            Precision::Second => "s",
            Precision::Minute => "m",
            Precision::Hour => "h",
        }
    }

    /// Scale `time` (in `self` units) to nanoseconds.
    pub fn to_nanos(self, time: i64) -> Result<i64, EncodingError> {
        time.checked_mul(self.nanos_per_unit())
            .ok_or(EncodingError::TimestampOverflow { time })
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One measurement sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, Value)>,
    time: i64,
    precision: Precision,
}

impl Point {
    /// Create a point with no tags, no fields and no timestamp.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            ..Default::default()
        }
    }

    /// Start a [`PointBuilder`].
    pub fn builder(measurement: impl Into<String>) -> PointBuilder {
        PointBuilder {
            point: Point::new(measurement),
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Tags in insertion order.
    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Raw timestamp in [`Point::precision`] units; `0` means "server assigns".
    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Look up a tag value by key.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a field value by key.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Add a tag. An existing key keeps its position and takes the new value.
    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.tags.push((key, value)),
        }
    }

    /// Add a field. An existing key keeps its position and takes the new value.
    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn set_time(&mut self, time: i64, precision: Precision) {
        self.time = time;
        self.precision = precision;
    }

    /// Timestamp in nanoseconds, or `None` when the point carries no timestamp.
    pub fn time_nanos(&self) -> Result<Option<i64>, EncodingError> {
        if self.time == 0 {
            return Ok(None);
        }
        self.precision.to_nanos(self.time).map(Some)
    }
}

/// Fluent builder for [`Point`].
///
/// ```
/// use tsdb_write::{Point, Precision};
///
/// let point = Point::builder("cpu")
///     .tag("host", "web-01")
///     .field("usage", 0.64)
///     .time(1_700_000_000, Precision::Second)
///     .build();
/// assert_eq!(point.tag("host"), Some("web-01"));
/// ```
#[derive(Debug, Clone)]
pub struct PointBuilder {
    point: Point,
}

impl PointBuilder {
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.point.add_tag(key, value);
        self
    }

    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.point.add_field(key, value);
        self
    }

    #[must_use]
    pub fn time(mut self, time: i64, precision: Precision) -> Self {
        self.point.set_time(time, precision);
        self
    }

    pub fn build(self) -> Point {
        self.point
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_table() {
        let expected = [
            (Precision::Nanosecond, 1),
            (Precision::Microsecond, 1_000),
            (Precision::Millisecond, 1_000_000),
            (Precision::Second, 1_000_000_000),
            (Precision::Minute, 60_000_000_000),
            (Precision::Hour, 3_600_000_000_000),
        ];
        for (precision, nanos) in expected {
            assert_eq!(precision.to_nanos(1).unwrap(), nanos);
        }
    }

    #[test]
    fn test_precision_overflow() {
        let err = Precision::Hour.to_nanos(i64::MAX / 2).unwrap_err();
        assert!(matches!(err, EncodingError::TimestampOverflow { .. }));
    }

    #[test]
    fn test_tags_keep_insertion_order() {
        let point = Point::builder("m")
            .tag("z", "1")
            .tag("a", "2")
            .tag("m", "3")
            .field("f", 1i64)
            .build();
        let keys: Vec<&str> = point.tags().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_duplicate_key_replaces_in_place() {
        let point = Point::builder("m")
            .field("a", 1i64)
            .field("b", 2i64)
            .field("a", "x")
            .build();
        assert_eq!(point.fields().len(), 2);
        assert_eq!(point.fields()[0].0, "a");
        assert_eq!(point.field("a"), Some(&Value::String("x".to_string())));
    }

    #[test]
    fn test_same_key_in_tags_and_fields() {
        let point = Point::builder("m").tag("k", "t").field("k", 1i64).build();
        assert_eq!(point.tag("k"), Some("t"));
        assert_eq!(point.field("k"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_time_nanos_zero_is_none() {
        let point = Point::builder("m").field("f", true).build();
        assert_eq!(point.time_nanos().unwrap(), None);

        let point = Point::builder("m")
            .field("f", true)
            .time(2, Precision::Millisecond)
            .build();
        assert_eq!(point.time_nanos().unwrap(), Some(2_000_000));
    }
}
