// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Record wire layout.
//!
//! All lengths and counts are 4-byte big-endian signed integers.
//!
//! ```text
//! +-----------------------------+
//! | schema_len                  |
//! | { name_len, name, type_id } |  type_id = zig-zag varint
//! +-----------------------------+
//! | column_count                |
//! | { values_len, values,       |
//! |   offsets_len, offsets[i32],|
//! |   bitmap_len, bitmap,       |
//! |   bitmap_offset, len,       |
//! |   null_count }              |
//! +-----------------------------+
//! | min_time (i64)              |
//! | max_time (i64)              |
//! +-----------------------------+
//! ```

use std::io::{self, Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::{ColumnType, ColumnValues, FieldSchemaEntry, Record};
use crate::error::EncodingError;

/// Longest zig-zag varint for a 64-bit value.
const MAX_VARINT_LEN: usize = 10;

impl Record {
    /// Serialize to the server's record layout.
    pub fn marshal(&self) -> Result<Vec<u8>, EncodingError> {
        let mut buf = Vec::with_capacity(self.encoded_size_hint());
        self.write_to(&mut buf)
            .map_err(|e| EncodingError::Malformed(e.to_string()))?;
        Ok(buf)
    }

    /// Write the record layout to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<BigEndian>(len_i32(self.schema.len())?)?;
        for entry in &self.schema {
            w.write_i32::<BigEndian>(len_i32(entry.name.len())?)?;
            w.write_all(entry.name.as_bytes())?;
            write_zigzag(w, entry.column_type.type_id())?;
        }

        w.write_i32::<BigEndian>(len_i32(self.columns.len())?)?;
        for col in &self.columns {
            write_column(w, col)?;
        }

        w.write_i64::<BigEndian>(self.min_time)?;
        w.write_i64::<BigEndian>(self.max_time)?;
        Ok(())
    }

    /// Parse a buffer produced by [`Record::marshal`].
    ///
    /// The measurement name travels outside the record block, so the caller
    /// supplies it.
    pub fn unmarshal(measurement: &str, bytes: &[u8]) -> Result<Record, EncodingError> {
        let mut r = Cursor::new(bytes);
        let record = read_record(measurement, &mut r).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => EncodingError::Malformed("truncated record".into()),
            _ => EncodingError::Malformed(e.to_string()),
        })?;

        let consumed = r.position() as usize;
        if consumed != bytes.len() {
            return Err(EncodingError::Malformed(format!(
                "{} trailing byte(s) after record",
                bytes.len() - consumed
            )));
        }
        Ok(record)
    }

    fn encoded_size_hint(&self) -> usize {
        let schema: usize = self.schema.iter().map(|e| 4 + e.name.len() + 1).sum();
        let columns: usize = self
            .columns
            .iter()
            .map(|c| 24 + c.values.len() + 4 * c.offsets.len() + c.bitmap.len())
            .sum();
        8 + schema + columns + 16
    }
}

fn write_column<W: Write>(w: &mut W, col: &ColumnValues) -> io::Result<()> {
    w.write_i32::<BigEndian>(len_i32(col.values.len())?)?;
    w.write_all(&col.values)?;

    w.write_i32::<BigEndian>(len_i32(col.offsets.len())?)?;
    for off in &col.offsets {
        w.write_i32::<BigEndian>(*off)?;
    }

    w.write_i32::<BigEndian>(len_i32(col.bitmap.len())?)?;
    w.write_all(&col.bitmap)?;

    w.write_i32::<BigEndian>(col.bitmap_offset)?;
    w.write_i32::<BigEndian>(col.len)?;
    w.write_i32::<BigEndian>(col.null_count)?;
    Ok(())
}

fn read_record(measurement: &str, r: &mut Cursor<&[u8]>) -> io::Result<Record> {
    let schema_len = read_len(r, 1)?;
    let mut schema = Vec::with_capacity(schema_len);
    for _ in 0..schema_len {
        let name_len = read_len(r, 1)?;
        let name = String::from_utf8(read_bytes(r, name_len)?)
            .map_err(|e| invalid(format!("field name is not UTF-8: {}", e)))?;
        let id = read_zigzag(r)?;
        let column_type = ColumnType::from_type_id(id)
            .ok_or_else(|| invalid(format!("unknown type id {} for '{}'", id, name)))?;
        schema.push(FieldSchemaEntry { name, column_type });
    }

    let column_count = read_len(r, 1)?;
    if column_count != schema_len {
        return Err(invalid(format!(
            "{} column(s) for {} schema entries",
            column_count, schema_len
        )));
    }
    let mut columns = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        columns.push(read_column(r)?);
    }

    let min_time = r.read_i64::<BigEndian>()?;
    let max_time = r.read_i64::<BigEndian>()?;

    Ok(Record {
        measurement: measurement.to_string(),
        schema,
        columns,
        min_time,
        max_time,
    })
}

fn read_column(r: &mut Cursor<&[u8]>) -> io::Result<ColumnValues> {
    let values_len = read_len(r, 1)?;
    let values = read_bytes(r, values_len)?;

    let offsets_len = read_len(r, 4)?;
    let mut offsets = Vec::with_capacity(offsets_len);
    for _ in 0..offsets_len {
        offsets.push(r.read_i32::<BigEndian>()?);
    }

    let bitmap_len = read_len(r, 1)?;
    let bitmap = read_bytes(r, bitmap_len)?;

    let bitmap_offset = r.read_i32::<BigEndian>()?;
    let len = r.read_i32::<BigEndian>()?;
    let null_count = r.read_i32::<BigEndian>()?;
    if len < 0 || null_count < 0 || null_count > len || bitmap_offset < 0 {
        return Err(invalid(format!(
            "bad column header: len={} null_count={} bitmap_offset={}",
            len, null_count, bitmap_offset
        )));
    }
    let bits_needed = (len as usize + bitmap_offset as usize).div_ceil(8);
    if bitmap.len() < bits_needed {
        return Err(invalid(format!(
            "bitmap of {} byte(s) cannot hold {} row(s)",
            bitmap.len(),
            len
        )));
    }

    Ok(ColumnValues {
        values,
        offsets,
        bitmap,
        bitmap_offset,
        len,
        null_count,
    })
}

/// Read a length prefix, rejecting negatives and lengths the remaining input
/// cannot hold (`unit` bytes per element).
fn read_len(r: &mut Cursor<&[u8]>, unit: usize) -> io::Result<usize> {
    let n = r.read_i32::<BigEndian>()?;
    if n < 0 {
        return Err(invalid(format!("negative length {}", n)));
    }
    let remaining = r.get_ref().len() - r.position() as usize;
    let n = n as usize;
    if n.saturating_mul(unit) > remaining {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "length exceeds remaining input",
        ));
    }
    Ok(n)
}

fn read_bytes(r: &mut Cursor<&[u8]>, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn len_i32(n: usize) -> io::Result<i32> {
    i32::try_from(n).map_err(|_| invalid(format!("length {} exceeds i32", n)))
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn write_zigzag<W: Write>(w: &mut W, v: i64) -> io::Result<()> {
    let mut u = ((v << 1) ^ (v >> 63)) as u64;
    while u >= 0x80 {
        w.write_u8((u as u8) | 0x80)?;
        u >>= 7;
    }
    w.write_u8(u as u8)
}

fn read_zigzag<R: Read>(r: &mut R) -> io::Result<i64> {
    let mut u: u64 = 0;
    for i in 0..MAX_VARINT_LEN {
        let b = r.read_u8()?;
        u |= u64::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Ok(((u >> 1) as i64) ^ -((u & 1) as i64));
        }
    }
    Err(invalid("varint longer than 10 bytes".into()))
}
