// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared recording transport for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use tsdb_write::{LineProtocolRequest, RecordRequest, Transport, TransportError};

/// Records every request; can be told to fail, to panic or to treat
/// endpoints as down.
#[derive(Default)]
pub struct RecordingTransport {
    pub lines: Mutex<Vec<(String, LineProtocolRequest)>>,
    pub records: Mutex<Vec<(String, RecordRequest)>>,
    pub unreachable: Mutex<HashSet<String>>,
    pub fail_status: AtomicBool,
    /// Sends that panic before any is recorded.
    pub panics: AtomicUsize,
    pub closes: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self, endpoint: &str) -> Result<(), TransportError> {
        if self
            .panics
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("transport crashed");
        }
        if self.unreachable.lock().contains(endpoint) {
            return Err(TransportError::Unreachable {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                code: 500,
                message: "internal error".to_string(),
            });
        }
        Ok(())
    }

    /// Line protocol bodies (uncompressed requests only), in send order.
    pub fn bodies(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .map(|(_, r)| String::from_utf8(r.body.clone()).unwrap())
            .collect()
    }

    /// Total number of lines received across all bodies.
    pub fn line_count(&self) -> usize {
        self.bodies()
            .iter()
            .map(|b| b.lines().filter(|l| !l.is_empty()).count())
            .sum()
    }

    pub fn endpoints_used(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .map(|(e, _)| e.clone())
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn send_line_protocol(
        &self,
        endpoint: &str,
        request: &LineProtocolRequest,
    ) -> Result<(), TransportError> {
        self.check(endpoint)?;
        self.lines
            .lock()
            .push((endpoint.to_string(), request.clone()));
        Ok(())
    }

    fn send_records(&self, endpoint: &str, request: &RecordRequest) -> Result<(), TransportError> {
        self.check(endpoint)?;
        self.records
            .lock()
            .push((endpoint.to_string(), request.clone()));
        Ok(())
    }

    fn ping(&self, endpoint: &str) -> Result<(), TransportError> {
        if self.unreachable.lock().contains(endpoint) {
            return Err(TransportError::Timeout);
        }
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
