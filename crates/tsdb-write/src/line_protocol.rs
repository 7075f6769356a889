// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Line Protocol serializer.
//!
//! Line Protocol format:
//! ```text
//! measurement[,tag1=val1,tag2=val2] field1=val1[,field2=val2][ timestamp_ns]
//! ```
//!
//! Tags and fields are written in insertion order. A point whose `time` is
//! `0` is written without a timestamp so the server assigns one.

use std::fmt::Write as _;

use crate::error::EncodingError;
use crate::point::{Point, Value};

impl Value {
    /// Append this value in Line Protocol form.
    ///
    /// - Float: written as-is (e.g., `3.14`)
    /// - Integer: suffixed with `i` (e.g., `42i`)
    /// - String: quoted, with `\` and `"` escaped (e.g., `"hello"`)
    /// - Boolean: `true` or `false`
    fn write_line_protocol(&self, key: &str, out: &mut String) -> Result<(), EncodingError> {
        match self {
            Value::Float(v) => {
                if !v.is_finite() {
                    return Err(EncodingError::NonFiniteFloat {
                        field: key.to_string(),
                        value: *v,
                    });
                }
                let _ = write!(out, "{}", v);
            }
            Value::Int(v) => {
                let _ = write!(out, "{}i", v);
            }
            Value::String(v) => {
                out.push('"');
                for c in v.chars() {
                    if c == '\\' || c == '"' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
            Value::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        }
        Ok(())
    }
}

/// Serialize one point to a Line Protocol line (no trailing newline).
pub fn serialize(point: &Point) -> Result<String, EncodingError> {
    let mut line = String::with_capacity(64);
    write_point(point, &mut line)?;
    Ok(line)
}

/// Serialize many points into one newline-separated request body.
pub fn serialize_batch<'a, I>(points: I) -> Result<String, EncodingError>
where
    I: IntoIterator<Item = &'a Point>,
{
    let mut body = String::new();
    for (i, point) in points.into_iter().enumerate() {
        if i > 0 {
            body.push('\n');
        }
        write_point(point, &mut body)?;
    }
    Ok(body)
}

/// Append one point to `out`. On error `out` may hold a partial line.
pub fn write_point(point: &Point, out: &mut String) -> Result<(), EncodingError> {
    if point.measurement().is_empty() {
        return Err(EncodingError::EmptyMeasurement);
    }

    escape_into(point.measurement(), MEASUREMENT_SPECIALS, out);

    for (key, value) in point.tags() {
        out.push(',');
        escape_into(key, KEY_SPECIALS, out);
        out.push('=');
        escape_into(value, KEY_SPECIALS, out);
    }

    // Space separator before fields
    out.push(' ');

    for (i, (key, value)) in point.fields().iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        escape_into(key, KEY_SPECIALS, out);
        out.push('=');
        value.write_line_protocol(key, out)?;
    }

    if let Some(nanos) = point.time_nanos()? {
        let _ = write!(out, " {}", nanos);
    }

    Ok(())
}

/// Measurement names escape commas and spaces.
const MEASUREMENT_SPECIALS: &[char] = &[',', ' '];

/// Tag keys, tag values and field keys escape commas, equals signs and spaces.
const KEY_SPECIALS: &[char] = &[',', '=', ' '];

fn escape_into(s: &str, specials: &[char], out: &mut String) {
    for c in s.chars() {
        if specials.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Escape a measurement name.
pub fn escape_measurement(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_into(s, MEASUREMENT_SPECIALS, &mut out);
    out
}

/// Escape a tag key, tag value or field key.
pub fn escape_key(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_into(s, KEY_SPECIALS, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Precision;

    fn unescape(s: &str) -> String {
        let mut out = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn test_field_value_float() {
        let mut out = String::new();
        Value::Float(3.15).write_line_protocol("f", &mut out).unwrap();
        assert_eq!(out, "3.15");
    }

    #[test]
    fn test_field_value_integer() {
        let mut out = String::new();
        Value::Int(-42).write_line_protocol("f", &mut out).unwrap();
        assert_eq!(out, "-42i");
    }

    #[test]
    fn test_field_value_string_with_quotes_and_backslash() {
        let mut out = String::new();
        Value::String(r#"say "hi" \o/"#.to_string())
            .write_line_protocol("f", &mut out)
            .unwrap();
        assert_eq!(out, r#""say \"hi\" \\o/""#);
    }

    #[test]
    fn test_field_value_boolean_unquoted() {
        let mut out = String::new();
        Value::Bool(true).write_line_protocol("f", &mut out).unwrap();
        out.push(' ');
        Value::Bool(false).write_line_protocol("f", &mut out).unwrap();
        assert_eq!(out, "true false");
    }

    #[test]
    fn test_reference_point() {
        let point = Point::builder("test")
            .tag("T0", "0")
            .field("a", 1i64)
            .time(1, Precision::Nanosecond)
            .build();
        assert_eq!(serialize(&point).unwrap(), "test,T0=0 a=1i 1");
    }

    #[test]
    fn test_tag_value_embedded_comma() {
        let point = Point::builder("test")
            .tag("T0", "0,")
            .field("a", 1i64)
            .time(1, Precision::Nanosecond)
            .build();
        assert_eq!(serialize(&point).unwrap(), "test,T0=0\\, a=1i 1");
    }

    #[test]
    fn test_zero_time_omits_timestamp() {
        let point = Point::builder("cpu").field("v", 1.5).build();
        assert_eq!(serialize(&point).unwrap(), "cpu v=1.5");
    }

    #[test]
    fn test_minute_precision_scaling() {
        let point = Point::builder("m")
            .field("v", 1i64)
            .time(1, Precision::Minute)
            .build();
        assert_eq!(serialize(&point).unwrap(), "m v=1i 60000000000");
    }

    #[test]
    fn test_every_precision_scales_exactly() {
        let cases = [
            (Precision::Nanosecond, "1"),
            (Precision::Microsecond, "1000"),
            (Precision::Millisecond, "1000000"),
            (Precision::Second, "1000000000"),
            (Precision::Minute, "60000000000"),
            (Precision::Hour, "3600000000000"),
        ];
        for (precision, ts) in cases {
            let point = Point::builder("m").field("v", 1i64).time(1, precision).build();
            assert_eq!(serialize(&point).unwrap(), format!("m v=1i {}", ts));
        }
    }

    #[test]
    fn test_insertion_order_not_sorted() {
        let point = Point::builder("weather")
            .tag("station", "north")
            .tag("area", "b")
            .field("temp", 22.1)
            .field("humidity", 65i64)
            .field("ok", true)
            .time(2, Precision::Second)
            .build();
        assert_eq!(
            serialize(&point).unwrap(),
            "weather,station=north,area=b temp=22.1,humidity=65i,ok=true 2000000000"
        );
    }

    #[test]
    fn test_escape_special_chars() {
        let point = Point::builder("my measurement,x=y")
            .tag("tag key", "tag,value=1")
            .field("field=key", "hello \"world\"")
            .time(3, Precision::Second)
            .build();
        assert_eq!(
            serialize(&point).unwrap(),
            "my\\ measurement\\,x=y,tag\\ key=tag\\,value\\=1 field\\=key=\"hello \\\"world\\\"\" 3000000000"
        );
    }

    #[test]
    fn test_unescape_round_trip() {
        let samples = ["plain", "a b", "a,b", "k=v", " ,= ", "ünï code", ""];
        for s in samples {
            assert_eq!(unescape(&escape_key(s)), s);
            assert_eq!(unescape(&escape_measurement(s)), s);
        }
    }

    #[test]
    fn test_serialize_is_idempotent() {
        let point = Point::builder("cpu")
            .tag("host", "a b")
            .field("v", 0.5)
            .field("s", "x")
            .time(10, Precision::Millisecond)
            .build();
        assert_eq!(serialize(&point).unwrap(), serialize(&point).unwrap());
    }

    #[test]
    fn test_same_key_in_tags_and_fields_preserved() {
        let point = Point::builder("m").tag("k", "t").field("k", 1i64).build();
        assert_eq!(serialize(&point).unwrap(), "m,k=t k=1i");
    }

    #[test]
    fn test_zero_fields_yields_empty_field_section() {
        let point = Point::builder("m")
            .tag("t", "1")
            .time(5, Precision::Nanosecond)
            .build();
        assert_eq!(serialize(&point).unwrap(), "m,t=1  5");
    }

    #[test]
    fn test_empty_measurement_rejected() {
        let point = Point::builder("").field("v", 1i64).build();
        assert!(matches!(
            serialize(&point),
            Err(EncodingError::EmptyMeasurement)
        ));
    }

    #[test]
    fn test_nan_rejected() {
        let point = Point::builder("m").field("v", f64::NAN).build();
        assert!(matches!(
            serialize(&point),
            Err(EncodingError::NonFiniteFloat { .. })
        ));
    }

    #[test]
    fn test_serialize_batch_joins_with_newlines() {
        let a = Point::builder("a").field("v", 1i64).build();
        let b = Point::builder("b").field("v", 2i64).build();
        assert_eq!(serialize_batch([&a, &b]).unwrap(), "a v=1i\nb v=2i");
        assert_eq!(serialize_batch(std::iter::empty()).unwrap(), "");
    }
}
