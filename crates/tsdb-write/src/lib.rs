// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Write ingestion client for a distributed time-series database.
//!
//! This crate provides:
//! - A point model with ordered tags and typed fields
//! - Line protocol serialization
//! - A columnar binary record encoder for the RPC write path
//! - Batching with size, time and backpressure policies
//! - Round-robin dispatch over several endpoints with health flags
//!
//! # Overview
//!
//! The crate does NOT open network connections. Encoded requests are handed
//! to a caller-supplied [`Transport`], which owns HTTP/RPC clients, TLS and
//! timeouts.
//!
//! ```text
//! Point --> WriteClient --> BatchProcessor --> line protocol | Record --> Transport
//!                                               (+ gzip / lz4)   (endpoint picked per send)
//! ```
//!
//! Delivery is at-least-once at best: nothing is retried, and points still
//! queued when the process dies are lost.

pub mod batch;
pub mod compress;
pub mod config;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod line_protocol;
pub mod point;
pub mod record;
pub mod transport;

pub use batch::{
    BatchOptions, BatchProcessor, BatchSink, DestinationBatch, DestinationKey, PendingEntry,
    ProcessorStats,
};
pub use compress::{Compression, Compressor};
pub use config::{ClientConfig, Protocol};
pub use dispatch::{WriteClient, WriteClientBuilder};
pub use endpoint::EndpointSelector;
pub use error::{ConfigError, EncodingError, Result, TransportError, WriteError};
pub use point::{Point, PointBuilder, Precision, Value};
pub use record::{ColumnType, ColumnValues, FieldSchemaEntry, Record};
pub use transport::{LineProtocolRequest, RecordRequest, Transport};
