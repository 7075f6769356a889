// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the write pipeline.
//!
//! | Error | Raised by | Reaches the caller |
//! |-------|-----------|--------------------|
//! | [`EncodingError`] | point check, line protocol / record codecs | always (batched writes check points before queueing) |
//! | [`TransportError`] | the [`Transport`](crate::Transport) collaborator | non-batched writes only |
//! | [`ConfigError`] | construction-time validation | always (construction fails) |
//! | [`WriteError`] | public write API | wraps the above |
//!
//! Batched writes never surface transport failures to the original caller;
//! those go to the configured exception handler.

use thiserror::Error;

/// Result alias for write operations.
pub type Result<T, E = WriteError> = std::result::Result<T, E>;

/// A point or record could not be mapped to a wire representation.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("measurement name is empty")]
    EmptyMeasurement,

    #[error("field '{field}' holds a non-finite float ({value}) which has no line protocol literal")]
    NonFiniteFloat { field: String, value: f64 },

    #[error("timestamp {time} overflows i64 when scaled to nanoseconds")]
    TimestampOverflow { time: i64 },

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// Failure reported by the transport collaborator.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection-level failure; the endpoint is treated as down.
    #[error("endpoint {endpoint} unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },

    /// The server answered with a non-success status.
    #[error("server returned status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Other(String),
}

/// Construction-time validation failures. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("endpoint list is empty")]
    NoEndpoints,

    #[error("invalid endpoint '{0}': expected scheme://host[:port]")]
    InvalidEndpoint(String),

    #[error("{name} must be positive")]
    NonPositive { name: &'static str },

    #[error("compression {compression} is not supported by the {protocol} protocol")]
    UnsupportedCompression {
        compression: &'static str,
        protocol: &'static str,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the public write API.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The batch processor is disabled or already shut down.
    #[error("batch processor is closed")]
    ProcessorClosed,

    #[error("failed to spawn flush thread: {0}")]
    Spawn(String),

    /// The sink panicked during a flush; the flush thread keeps running.
    #[error("flush panicked: {0}")]
    FlushPanicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_error_display() {
        let err = EncodingError::NonFiniteFloat {
            field: "temp".to_string(),
            value: f64::NAN,
        };
        assert!(err.to_string().contains("temp"));
        assert_eq!(
            EncodingError::EmptyMeasurement.to_string(),
            "measurement name is empty"
        );
    }

    #[test]
    fn test_write_error_from_transport() {
        let err: WriteError = TransportError::Timeout.into();
        assert!(matches!(err, WriteError::Transport(TransportError::Timeout)));
        assert_eq!(err.to_string(), "transport error: request timed out");
    }

    #[test]
    fn test_config_error_non_positive() {
        let err = ConfigError::NonPositive { name: "actions" };
        assert_eq!(err.to_string(), "actions must be positive");
    }
}
