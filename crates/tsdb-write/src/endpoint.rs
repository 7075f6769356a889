// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Round-robin endpoint selection with health flags.
//!
//! The endpoint list is fixed at construction. Selection is lock-free: a
//! shared `AtomicUsize` counter picks the next slot and endpoints flagged down
//! are skipped. When every endpoint is down the plain round-robin pick is
//! returned so writes still go somewhere.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::ConfigError;

#[derive(Debug)]
struct Endpoint {
    url: String,
    down: AtomicBool,
}

/// Thread-safe round-robin selector over a fixed endpoint list.
#[derive(Debug)]
pub struct EndpointSelector {
    endpoints: Vec<Endpoint>,
    next: AtomicUsize,
}

impl EndpointSelector {
    /// Build a selector. An empty list is a configuration error.
    pub fn new<I, S>(urls: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints: Vec<Endpoint> = urls
            .into_iter()
            .map(|url| Endpoint {
                url: url.into(),
                down: AtomicBool::new(false),
            })
            .collect();

        if endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }

        Ok(Self {
            endpoints,
            next: AtomicUsize::new(0),
        })
    }

    /// Pick the endpoint for the next physical send.
    pub fn next(&self) -> &str {
        let len = self.endpoints.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed);

        for i in 0..len {
            let ep = &self.endpoints[start.wrapping_add(i) % len];
            if !ep.down.load(Ordering::Acquire) {
                return &ep.url;
            }
        }

        &self.endpoints[start % len].url
    }

    /// Flag an endpoint as unhealthy. Returns `false` if the URL is unknown.
    pub fn mark_down(&self, url: &str) -> bool {
        self.set_down(url, true)
    }

    /// Clear the unhealthy flag. Returns `false` if the URL is unknown.
    pub fn mark_up(&self, url: &str) -> bool {
        self.set_down(url, false)
    }

    fn set_down(&self, url: &str, down: bool) -> bool {
        match self.find(url) {
            Some(ep) => {
                let was = ep.down.swap(down, Ordering::AcqRel);
                if was != down {
                    if down {
                        log::warn!("[endpoint] {} marked down", url);
                    } else {
                        log::info!("[endpoint] {} back up", url);
                    }
                }
                true
            }
            None => false,
        }
    }

    pub fn is_down(&self, url: &str) -> bool {
        self.find(url)
            .is_some_and(|ep| ep.down.load(Ordering::Acquire))
    }

    /// Endpoint URLs in configuration order.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|ep| ep.url.as_str())
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    fn find(&self, url: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|ep| ep.url == url)
    }
}
