// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request body compression.
//!
//! - **Gzip** (flate2): accepted by both the line protocol and record endpoints
//! - **Lz4** (lz4_flex, block format with prepended size): record endpoint only
//!
//! One [`Compressor`] is owned by each [`WriteClient`](crate::WriteClient)
//! and shared by every send path of that client.

use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Deserialize;

use crate::error::EncodingError;

/// Body compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Lz4,
}

impl Compression {
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Lz4 => "lz4",
        }
    }

    /// HTTP `Content-Encoding` value, if any.
    pub fn content_encoding(self) -> Option<&'static str> {
        match self {
            Compression::Gzip => Some("gzip"),
            Compression::None | Compression::Lz4 => None,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte counters, shared across threads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressStats {
    pub compressed_count: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl CompressStats {
    /// Output/input size ratio (1.0 = no gain).
    pub fn ratio(&self) -> f64 {
        if self.bytes_in == 0 {
            1.0
        } else {
            self.bytes_out as f64 / self.bytes_in as f64
        }
    }
}

/// Compresses request bodies with a fixed algorithm.
#[derive(Debug)]
pub struct Compressor {
    algo: Compression,
    gzip_level: u32,
    compressed_count: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl Compressor {
    pub fn new(algo: Compression) -> Self {
        Self::with_level(algo, 6)
    }

    /// `gzip_level` is clamped to `0..=9`.
    pub fn with_level(algo: Compression, gzip_level: u32) -> Self {
        Self {
            algo,
            gzip_level: gzip_level.min(9),
            compressed_count: AtomicU64::new(0),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
        }
    }

    pub fn algorithm(&self) -> Compression {
        self.algo
    }

    /// Compress `payload`. With [`Compression::None`] the bytes are copied.
    pub fn compress(&self, payload: &[u8]) -> Result<Vec<u8>, EncodingError> {
        let out = match self.algo {
            Compression::None => return Ok(payload.to_vec()),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(
                    Vec::with_capacity(payload.len() / 2),
                    flate2::Compression::new(self.gzip_level),
                );
                encoder.write_all(payload)?;
                encoder.finish()?
            }
            Compression::Lz4 => lz4_flex::compress_prepend_size(payload),
        };

        self.compressed_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_in
            .fetch_add(payload.len() as u64, Ordering::Relaxed);
        self.bytes_out.fetch_add(out.len() as u64, Ordering::Relaxed);
        log::trace!(
            "[dispatch] {} compressed {} -> {} bytes",
            self.algo,
            payload.len(),
            out.len()
        );
        Ok(out)
    }

    /// Reverse [`compress`](Self::compress).
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, EncodingError> {
        match self.algo {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut out = Vec::with_capacity(data.len() * 2);
                GzDecoder::new(data).read_to_end(&mut out)?;
                Ok(out)
            }
            Compression::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| EncodingError::Malformed(format!("lz4: {}", e))),
        }
    }

    pub fn stats(&self) -> CompressStats {
        CompressStats {
            compressed_count: self.compressed_count.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(Compression::None)
    }
}
