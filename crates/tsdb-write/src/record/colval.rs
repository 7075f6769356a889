// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Column value buffer (`ColVal`).
//!
//! ```text
//! values   packed non-null values, 8-byte big-endian for Int64/Float64,
//!          1 byte for Bool, raw UTF-8 for String/Tag
//! offsets  String/Tag only: start offset of every row (nulls included)
//! bitmap   one bit per row, LSB-first, 1 = present
//! ```

use byteorder::{BigEndian, ByteOrder};

/// One column of a [`Record`](super::Record).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnValues {
    pub(crate) values: Vec<u8>,
    pub(crate) offsets: Vec<i32>,
    pub(crate) bitmap: Vec<u8>,
    pub(crate) bitmap_offset: i32,
    pub(crate) len: i32,
    pub(crate) null_count: i32,
}

impl ColumnValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_int(&mut self, v: i64) {
        let mut buf = [0u8; 8];
        BigEndian::write_i64(&mut buf, v);
        self.values.extend_from_slice(&buf);
        self.push_bit(true);
    }

    pub fn append_float(&mut self, v: f64) {
        let mut buf = [0u8; 8];
        BigEndian::write_f64(&mut buf, v);
        self.values.extend_from_slice(&buf);
        self.push_bit(true);
    }

    pub fn append_bool(&mut self, v: bool) {
        self.values.push(u8::from(v));
        self.push_bit(true);
    }

    pub fn append_str(&mut self, v: &str) {
        self.offsets.push(self.values.len() as i32);
        self.values.extend_from_slice(v.as_bytes());
        self.push_bit(true);
    }

    /// Null row in a fixed-width column: no value bytes.
    pub fn append_null(&mut self) {
        self.push_bit(false);
        self.null_count += 1;
    }

    /// Null row in a String/Tag column: the offset still advances the row count.
    pub fn append_str_null(&mut self) {
        self.offsets.push(self.values.len() as i32);
        self.append_null();
    }

    fn push_bit(&mut self, present: bool) {
        let row = self.len as usize;
        if row % 8 == 0 {
            self.bitmap.push(0);
        }
        if present {
            self.bitmap[row >> 3] |= 1 << (row & 7);
        }
        self.len += 1;
    }

    /// Number of rows (null rows included).
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn null_count(&self) -> usize {
        self.null_count as usize
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    pub fn bitmap(&self) -> &[u8] {
        &self.bitmap
    }

    pub fn is_null(&self, row: usize) -> bool {
        let pos = row + self.bitmap_offset as usize;
        match self.bitmap.get(pos >> 3) {
            Some(byte) => byte & (1 << (pos & 7)) == 0,
            None => true,
        }
    }

    /// Decode an Int64 column, `None` for null rows.
    pub fn int_values(&self) -> Vec<Option<i64>> {
        self.fixed_values(8, BigEndian::read_i64)
    }

    /// Decode a Float64 column, `None` for null rows.
    pub fn float_values(&self) -> Vec<Option<f64>> {
        self.fixed_values(8, BigEndian::read_f64)
    }

    /// Decode a Bool column, `None` for null rows.
    pub fn bool_values(&self) -> Vec<Option<bool>> {
        self.fixed_values(1, |b| b[0] != 0)
    }

    /// Decode a String/Tag column, `None` for null rows.
    pub fn str_values(&self) -> Vec<Option<&str>> {
        (0..self.len())
            .map(|row| {
                if self.is_null(row) {
                    return None;
                }
                let start = *self.offsets.get(row)? as usize;
                let end = self
                    .offsets
                    .get(row + 1)
                    .map_or(self.values.len(), |o| *o as usize);
                std::str::from_utf8(self.values.get(start..end)?).ok()
            })
            .collect()
    }

    fn fixed_values<T>(&self, width: usize, read: impl Fn(&[u8]) -> T) -> Vec<Option<T>> {
        let mut cursor = 0;
        (0..self.len())
            .map(|row| {
                if self.is_null(row) {
                    return None;
                }
                let slot = self.values.get(cursor..cursor + width)?;
                cursor += width;
                Some(read(slot))
            })
            .collect()
    }
}
