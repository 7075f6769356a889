// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport collaborator.
//!
//! The crate does not open connections itself. A [`Transport`] receives fully
//! encoded (and compressed) requests together with the endpoint chosen for
//! that physical send, and owns timeouts, TLS and connection reuse.

use crate::compress::Compression;
use crate::error::TransportError;
use crate::point::Precision;
use crate::record::Record;

/// One line protocol write.
#[derive(Debug, Clone)]
pub struct LineProtocolRequest {
    pub database: String,
    pub retention_policy: String,
    /// Unit of the timestamps in `body`.
    pub precision: Precision,
    /// Encoding already applied to `body`.
    pub compression: Compression,
    pub body: Vec<u8>,
}

/// One record write (binary RPC).
#[derive(Debug, Clone)]
pub struct RecordRequest {
    pub database: String,
    pub retention_policy: String,
    /// Encoding already applied to every block in `payload`.
    pub compression: Compression,
    /// Decoded form, one per measurement.
    pub records: Vec<Record>,
    /// Marshalled and compressed blocks, aligned with `records`.
    pub payload: Vec<Vec<u8>>,
}

/// Sends encoded requests to a server endpoint.
pub trait Transport: Send + Sync {
    fn send_line_protocol(
        &self,
        endpoint: &str,
        request: &LineProtocolRequest,
    ) -> Result<(), TransportError>;

    fn send_records(&self, endpoint: &str, request: &RecordRequest)
        -> Result<(), TransportError>;

    /// Health check used by endpoint checks.
    fn ping(&self, _endpoint: &str) -> Result<(), TransportError> {
        Ok(())
    }

    /// Release connections. Called once when the client closes.
    fn close(&self) {}
}
