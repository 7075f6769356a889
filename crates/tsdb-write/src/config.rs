// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML configuration for the write client.
//!
//! ```yaml
//! endpoints:
//!   - "http://tsdb-1:8086"
//!   - "http://tsdb-2:8086"
//! protocol: http        # http | grpc
//! compression: gzip     # none | gzip | lz4 (lz4: grpc only)
//! batch:                # omit to write synchronously
//!   actions: 1000
//!   flush_interval_ms: 1000
//!   jitter_ms: 0
//!   buffer_limit: 10000 # 0 = unbounded
//!   drop_on_exhaustion: false
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::batch::{BatchOptions, DEFAULT_ACTIONS, DEFAULT_BUFFER_LIMIT, DEFAULT_FLUSH_INTERVAL};
use crate::compress::Compression;
use crate::error::ConfigError;

/// Wire protocol used for writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Line protocol over HTTP.
    #[default]
    Http,
    /// Columnar records over RPC.
    Grpc,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Grpc => "grpc",
        }
    }

    /// Whether the server endpoint for this protocol accepts `compression`.
    pub fn supports(self, compression: Compression) -> bool {
        match self {
            Protocol::Http => matches!(compression, Compression::None | Compression::Gzip),
            Protocol::Grpc => true,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Server endpoints, `scheme://host[:port]`.
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub compression: Compression,
    /// Batching settings. None = every write is sent immediately.
    #[serde(default)]
    pub batch: Option<BatchConfig>,
}

/// Batching thresholds as written in YAML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchConfig {
    /// Points that trigger an immediate flush. None = default (1000).
    pub actions: Option<usize>,
    /// Periodic flush interval. None = default (1000).
    pub flush_interval_ms: Option<u64>,
    /// Random delay bound added to each interval. None = 0.
    pub jitter_ms: Option<u64>,
    /// Queue capacity, 0 = unbounded. None = default (10000).
    pub buffer_limit: Option<usize>,
    /// Drop instead of blocking when the queue is full.
    #[serde(default)]
    pub drop_on_exhaustion: bool,
}

impl BatchConfig {
    pub fn to_options(&self) -> BatchOptions {
        BatchOptions {
            actions: self.actions.unwrap_or(DEFAULT_ACTIONS),
            flush_interval: self
                .flush_interval_ms
                .map_or(DEFAULT_FLUSH_INTERVAL, Duration::from_millis),
            jitter: Duration::from_millis(self.jitter_ms.unwrap_or(0)),
            buffer_limit: self.buffer_limit.unwrap_or(DEFAULT_BUFFER_LIMIT),
            drop_on_exhaustion: self.drop_on_exhaustion,
        }
    }
}

impl ClientConfig {
    /// Configuration with defaults and no batching.
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            protocol: Protocol::default(),
            compression: Compression::default(),
            batch: None,
        }
    }

    /// Parse and validate a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        for url in &self.endpoints {
            validate_endpoint(url)?;
        }
        if !self.protocol.supports(self.compression) {
            return Err(ConfigError::UnsupportedCompression {
                compression: self.compression.as_str(),
                protocol: self.protocol.as_str(),
            });
        }
        if let Some(batch) = &self.batch {
            batch.to_options().validate()?;
        }
        Ok(())
    }

    /// Batch options, if batching is configured.
    pub fn batch_options(&self) -> Option<BatchOptions> {
        self.batch.as_ref().map(BatchConfig::to_options)
    }
}

/// `scheme://host[:port][/path]` with a non-empty scheme and host and a
/// numeric port.
fn validate_endpoint(url: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidEndpoint(url.to_string());

    let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return Err(invalid());
    }

    let authority = rest.split('/').next().unwrap_or_default();
    let (host, port) = match authority.rsplit_once(':') {
        // bracketed IPv6 without a port
        Some((_, p)) if p.ends_with(']') => (authority, None),
        Some((h, p)) => (h, Some(p)),
        None => (authority, None),
    };
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(invalid());
    }
    if let Some(port) = port {
        port.parse::<u16>().map_err(|_| invalid())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
endpoints:
  - "http://localhost:8086"
"#;

    const FULL_YAML: &str = r#"
endpoints:
  - "http://tsdb-1.example.com:8086"
  - "http://tsdb-2.example.com:8086"
protocol: grpc
compression: lz4
batch:
  actions: 500
  flush_interval_ms: 2000
  jitter_ms: 100
  buffer_limit: 0
  drop_on_exhaustion: true
"#;

    #[test]
    fn test_config_parse_minimal() {
        let config = ClientConfig::from_yaml(MINIMAL_YAML).expect("parse minimal yaml");
        assert_eq!(config.endpoints, vec!["http://localhost:8086"]);
        assert_eq!(config.protocol, Protocol::Http);
        assert_eq!(config.compression, Compression::None);
        assert!(config.batch.is_none());
        assert!(config.batch_options().is_none());
    }

    #[test]
    fn test_config_parse_all_fields() {
        let config = ClientConfig::from_yaml(FULL_YAML).expect("parse full yaml");
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.protocol, Protocol::Grpc);
        assert_eq!(config.compression, Compression::Lz4);

        let opts = config.batch_options().expect("batch configured");
        assert_eq!(opts.actions, 500);
        assert_eq!(opts.flush_interval, Duration::from_millis(2000));
        assert_eq!(opts.jitter, Duration::from_millis(100));
        assert_eq!(opts.buffer_limit, 0);
        assert!(opts.drop_on_exhaustion);
    }

    #[test]
    fn test_batch_defaults() {
        let opts = BatchConfig::default().to_options();
        assert_eq!(opts, BatchOptions::default());
    }

    #[test]
    fn test_empty_endpoints_rejected() {
        let err = ClientConfig::from_yaml("endpoints: []").unwrap_err();
        assert!(matches!(err, ConfigError::NoEndpoints));
    }

    #[test]
    fn test_invalid_endpoints_rejected() {
        for url in ["localhost:8086", "://host", "http://", "http://host:port", "http:// x"] {
            let err = ClientConfig::new([url]).validate().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidEndpoint(_)),
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn test_valid_endpoints_accepted() {
        for url in [
            "http://localhost",
            "https://tsdb.example.com:8443/base",
            "grpc://10.0.0.1:8305",
            "http://[::1]",
            "http://[::1]:8086",
        ] {
            assert!(ClientConfig::new([url]).validate().is_ok(), "{}", url);
        }
    }

    #[test]
    fn test_lz4_not_allowed_over_http() {
        let yaml = r#"
endpoints: ["http://localhost:8086"]
protocol: http
compression: lz4
"#;
        let err = ClientConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedCompression { .. }));
    }

    #[test]
    fn test_zero_actions_rejected() {
        let yaml = r#"
endpoints: ["http://localhost:8086"]
batch:
  actions: 0
"#;
        let err = ClientConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::NonPositive { name: "actions" }));
    }

    #[test]
    fn test_zero_flush_interval_rejected() {
        let yaml = r#"
endpoints: ["http://localhost:8086"]
batch:
  flush_interval_ms: 0
"#;
        assert!(ClientConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unknown_protocol_is_yaml_error() {
        let yaml = r#"
endpoints: ["http://localhost:8086"]
protocol: carrier-pigeon
"#;
        assert!(matches!(
            ClientConfig::from_yaml(yaml),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("client.yaml");
        std::fs::write(&path, FULL_YAML).expect("write config");
        let config = ClientConfig::from_file(&path).expect("load config");
        assert_eq!(config.protocol, Protocol::Grpc);

        let missing = dir.path().join("missing.yaml");
        assert!(matches!(
            ClientConfig::from_file(&missing),
            Err(ConfigError::Io(_))
        ));
    }
}
