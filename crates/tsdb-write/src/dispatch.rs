// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Write dispatcher.
//!
//! [`WriteClient`] is the public entry point. It encodes points with the
//! codec of the configured [`Protocol`], compresses the body, picks an
//! endpoint per physical send and hands the request to the [`Transport`].
//!
//! ```text
//!                      batching off
//! write() ----------------------------------------> send_points()
//!    |                                                   ^
//!    | batching on                                       |
//!    +--> BatchProcessor::put() --(flush thread)--> BatchSink::send()
//!
//! send_points(): encode -> compress -> EndpointSelector::next() -> Transport
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::batch::{
    BatchOptions, BatchProcessor, BatchSink, DestinationBatch, DestinationKey, DroppedHandler,
    ExceptionHandler, PendingEntry, ProcessorStats,
};
use crate::compress::{CompressStats, Compression, Compressor};
use crate::config::{ClientConfig, Protocol};
use crate::endpoint::EndpointSelector;
use crate::error::{EncodingError, Result, TransportError, WriteError};
use crate::line_protocol;
use crate::point::{Point, Precision, Value};
use crate::record;
use crate::transport::{LineProtocolRequest, RecordRequest, Transport};

/// Encodes and sends; shared by the direct path and the flush thread.
struct Dispatcher {
    protocol: Protocol,
    selector: EndpointSelector,
    compressor: Compressor,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    /// Reject a point the configured codec cannot encode. Run before a point
    /// is queued so a flush never meets one.
    fn check_point(&self, point: &Point) -> std::result::Result<(), EncodingError> {
        if point.measurement().is_empty() {
            return Err(EncodingError::EmptyMeasurement);
        }
        point.time_nanos()?;
        if self.protocol == Protocol::Http {
            for (field, value) in point.fields() {
                if let Value::Float(v) = value {
                    if !v.is_finite() {
                        return Err(EncodingError::NonFiniteFloat {
                            field: field.clone(),
                            value: *v,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// One physical send of `points` to `key`.
    fn send_points(&self, key: &DestinationKey, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        match self.protocol {
            Protocol::Http => self.send_line_protocol(key, points),
            Protocol::Grpc => self.send_records(key, points),
        }
    }

    fn send_line_protocol(&self, key: &DestinationKey, points: &[Point]) -> Result<()> {
        let body = line_protocol::serialize_batch(points)?;
        let request = LineProtocolRequest {
            database: key.database.clone(),
            retention_policy: key.retention_policy.clone(),
            precision: Precision::Nanosecond,
            compression: self.compressor.algorithm(),
            body: self.compressor.compress(body.as_bytes())?,
        };

        let endpoint = self.selector.next();
        log::trace!(
            "[dispatch] {} point(s) for {} -> {} ({} bytes)",
            points.len(),
            key,
            endpoint,
            request.body.len()
        );
        self.transport
            .send_line_protocol(endpoint, &request)
            .map_err(|e| self.on_transport_error(endpoint, e))
    }

    fn send_records(&self, key: &DestinationKey, points: &[Point]) -> Result<()> {
        let records = record::build_records(points);
        if records.is_empty() {
            log::warn!(
                "[dispatch] none of {} point(s) for {} could be encoded",
                points.len(),
                key
            );
            return Ok(());
        }
        let payload = records
            .iter()
            .map(|r| {
                let block = r.marshal()?;
                self.compressor.compress(&block)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let request = RecordRequest {
            database: key.database.clone(),
            retention_policy: key.retention_policy.clone(),
            compression: self.compressor.algorithm(),
            records,
            payload,
        };

        let endpoint = self.selector.next();
        log::trace!(
            "[dispatch] {} record(s) for {} -> {}",
            request.records.len(),
            key,
            endpoint
        );
        self.transport
            .send_records(endpoint, &request)
            .map_err(|e| self.on_transport_error(endpoint, e))
    }

    fn on_transport_error(&self, endpoint: &str, err: TransportError) -> WriteError {
        if matches!(err, TransportError::Unreachable { .. }) {
            self.selector.mark_down(endpoint);
        }
        err.into()
    }
}

impl BatchSink for Dispatcher {
    /// Sends each destination in turn; the first failure aborts the flush.
    fn send(&self, batches: &[DestinationBatch]) -> Result<()> {
        if batches.is_empty() {
            log::trace!("[dispatch] empty flush");
        }
        for batch in batches {
            self.send_points(&batch.key, &batch.points)?;
        }
        Ok(())
    }

    fn close(&self) {
        self.transport.close();
    }
}

/// Client for writing points to a set of server endpoints.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use tsdb_write::{Point, Transport, WriteClient, LineProtocolRequest, RecordRequest, TransportError};
/// # struct Http;
/// # impl Transport for Http {
/// #     fn send_line_protocol(&self, _: &str, _: &LineProtocolRequest) -> Result<(), TransportError> { Ok(()) }
/// #     fn send_records(&self, _: &str, _: &RecordRequest) -> Result<(), TransportError> { Ok(()) }
/// # }
/// let client = WriteClient::builder(Arc::new(Http))
///     .endpoint("http://localhost:8086")
///     .build()?;
/// client.write("metrics", "autogen", Point::builder("cpu").field("usage", 0.5).build())?;
/// client.close();
/// # Ok::<(), tsdb_write::WriteError>(())
/// ```
pub struct WriteClient {
    dispatcher: Arc<Dispatcher>,
    processor: Option<BatchProcessor>,
    closed: AtomicBool,
}

impl WriteClient {
    pub fn builder(transport: Arc<dyn Transport>) -> WriteClientBuilder {
        WriteClientBuilder::new(transport)
    }

    /// Build a client from a validated configuration.
    pub fn from_config(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::builder(transport).config(config).build()
    }

    /// Write one point to `database`/`retention_policy`.
    pub fn write(&self, database: &str, retention_policy: &str, point: Point) -> Result<()> {
        self.write_points(database, retention_policy, vec![point])
    }

    /// Write points to `database`/`retention_policy`.
    ///
    /// Every point is checked first; if one cannot be encoded the call
    /// returns its [`EncodingError`] and none of `points` is sent or queued.
    ///
    /// Without batching the points are encoded and sent in one transport call
    /// before returning, and every error is returned. An empty `points` makes
    /// no transport call. With batching they are queued; transport errors of
    /// a later flush go to the exception handler.
    pub fn write_points(
        &self,
        database: &str,
        retention_policy: &str,
        points: Vec<Point>,
    ) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WriteError::ProcessorClosed);
        }
        for point in &points {
            self.dispatcher.check_point(point)?;
        }
        let key = DestinationKey::new(database, retention_policy);

        match &self.processor {
            None => self.dispatcher.send_points(&key, &points),
            Some(processor) => {
                for point in points {
                    processor.put(PendingEntry::new(point, key.clone()))?;
                }
                Ok(())
            }
        }
    }

    /// Flush queued points now and wait. No-op without batching.
    pub fn flush(&self) {
        if let Some(processor) = &self.processor {
            processor.flush();
        }
    }

    /// Ping every endpoint and update its health flag. Returns how many
    /// endpoints answered.
    pub fn check_endpoints(&self) -> usize {
        let selector = &self.dispatcher.selector;
        let mut healthy = 0;
        for url in selector.endpoints() {
            match self.dispatcher.transport.ping(url) {
                Ok(()) => {
                    selector.mark_up(url);
                    healthy += 1;
                }
                Err(e) => {
                    log::debug!("[dispatch] ping {} failed: {}", url, e);
                    selector.mark_down(url);
                }
            }
        }
        healthy
    }

    pub fn endpoints(&self) -> &EndpointSelector {
        &self.dispatcher.selector
    }

    pub fn protocol(&self) -> Protocol {
        self.dispatcher.protocol
    }

    pub fn is_batching(&self) -> bool {
        self.processor.is_some()
    }

    /// Batch processor counters. None without batching.
    pub fn stats(&self) -> Option<ProcessorStats> {
        self.processor.as_ref().map(BatchProcessor::stats)
    }

    pub fn compress_stats(&self) -> CompressStats {
        self.dispatcher.compressor.stats()
    }

    /// Flush pending points, stop the flush thread and close the transport.
    /// Later writes fail with [`WriteError::ProcessorClosed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match &self.processor {
            Some(processor) => processor.flush_and_shutdown(),
            None => self.dispatcher.transport.close(),
        }
        log::debug!("[dispatch] client closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for WriteClient {
    fn drop(&mut self) {
        if !self.is_closed() {
            log::warn!("[dispatch] WriteClient dropped without close(), flushing");
            self.close();
        }
    }
}

/// Builder for [`WriteClient`].
pub struct WriteClientBuilder {
    transport: Arc<dyn Transport>,
    endpoints: Vec<String>,
    protocol: Protocol,
    compression: Compression,
    batch: Option<BatchOptions>,
    dropped_handler: Option<DroppedHandler>,
    exception_handler: Option<ExceptionHandler>,
}

impl WriteClientBuilder {
    fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            endpoints: Vec::new(),
            protocol: Protocol::default(),
            compression: Compression::default(),
            batch: None,
            dropped_handler: None,
            exception_handler: None,
        }
    }

    /// Take endpoints, protocol, compression and batching from `config`.
    #[must_use]
    pub fn config(mut self, config: &ClientConfig) -> Self {
        self.endpoints = config.endpoints.clone();
        self.protocol = config.protocol;
        self.compression = config.compression;
        self.batch = config.batch_options();
        self
    }

    #[must_use]
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoints.push(url.into());
        self
    }

    #[must_use]
    pub fn endpoints<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints.extend(urls.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    #[must_use]
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Enable batching.
    #[must_use]
    pub fn batch(mut self, options: BatchOptions) -> Self {
        self.batch = Some(options);
        self
    }

    #[must_use]
    pub fn dropped_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(PendingEntry) + Send + Sync + 'static,
    {
        self.dropped_handler = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn exception_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&WriteError, &[Point]) + Send + Sync + 'static,
    {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    /// Validate and start the client. With batching the flush thread is
    /// started here.
    pub fn build(self) -> Result<WriteClient> {
        let config = ClientConfig {
            endpoints: self.endpoints,
            protocol: self.protocol,
            compression: self.compression,
            batch: None,
        };
        config.validate()?;

        let dispatcher = Arc::new(Dispatcher {
            protocol: config.protocol,
            selector: EndpointSelector::new(config.endpoints)?,
            compressor: Compressor::new(config.compression),
            transport: self.transport,
        });

        let processor = match self.batch {
            Some(options) => {
                let sink: Arc<dyn BatchSink> = dispatcher.clone();
                let processor = BatchProcessor::with_handlers(
                    options,
                    sink,
                    self.dropped_handler,
                    self.exception_handler,
                )?;
                processor.enable()?;
                Some(processor)
            }
            None => None,
        };

        log::debug!(
            "[dispatch] client ready ({} endpoint(s), protocol={}, compression={}, batching={})",
            dispatcher.selector.len(),
            dispatcher.protocol,
            dispatcher.compressor.algorithm(),
            processor.is_some()
        );

        Ok(WriteClient {
            dispatcher,
            processor,
            closed: AtomicBool::new(false),
        })
    }
}
