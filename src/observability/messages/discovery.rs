// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for [`crate::discover::GraphDiscoverer`] lifecycle and per-vertex events.

use std::fmt::{Display, Formatter};

use tracing::Span;

use crate::observability::messages::StructuredLog;

/// A discovery run started from the given number of roots.
///
/// # Log Level
/// `info!`
pub struct DiscoveryStarted {
    pub root_count: usize,
}

impl Display for DiscoveryStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "starting discovery from {} root(s)", self.root_count)
    }
}

impl StructuredLog for DiscoveryStarted {
    fn log(&self) {
        tracing::info!(root_count = self.root_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("discovery", span_name = name, root_count = self.root_count)
    }
}

/// A discovery run reached every reachable vertex without error.
///
/// # Log Level
/// `info!`
pub struct DiscoveryCompleted;

impl Display for DiscoveryCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "discovery completed")
    }
}

impl StructuredLog for DiscoveryCompleted {
    fn log(&self) {
        tracing::info!("{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("discovery_completed", span_name = name)
    }
}

/// A discovery run ended early with an error.
///
/// # Log Level
/// `error!`
pub struct DiscoveryFailed<'a> {
    pub error: &'a dyn std::error::Error,
}

impl Display for DiscoveryFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "discovery failed: {}", self.error)
    }
}

impl StructuredLog for DiscoveryFailed<'_> {
    fn log(&self) {
        tracing::error!(error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("discovery_failed", span_name = name, error = %self.error)
    }
}

/// A single vertex entered `Discovering`: its author is about to call `Resolve`.
///
/// # Log Level
/// `debug!`
pub struct VertexDiscovering<'a, K: Display> {
    pub key: &'a K,
}

impl<K: Display> Display for VertexDiscovering<'_, K> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "discovering vertex {}", self.key)
    }
}

impl<K: Display> StructuredLog for VertexDiscovering<'_, K> {
    fn log(&self) {
        tracing::debug!(key = %self.key, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("vertex_discovering", span_name = name, key = %self.key)
    }
}

/// A single vertex finished `Discovering` with every child edge recorded.
///
/// # Log Level
/// `debug!`
pub struct VertexDiscoveryCompleted<'a, K: Display> {
    pub key: &'a K,
}

impl<K: Display> Display for VertexDiscoveryCompleted<'_, K> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "vertex {} discovered", self.key)
    }
}

impl<K: Display> StructuredLog for VertexDiscoveryCompleted<'_, K> {
    fn log(&self) {
        tracing::debug!(key = %self.key, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("vertex_discovery_completed", span_name = name, key = %self.key)
    }
}

/// `Resolve` or `Discover` failed for a single vertex.
///
/// # Log Level
/// `warn!`
pub struct VertexDiscoveryFailed<'a, K: Display> {
    pub key: &'a K,
    pub error: &'a dyn std::error::Error,
}

impl<K: Display> Display for VertexDiscoveryFailed<'_, K> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "vertex {} failed discovery: {}", self.key, self.error)
    }
}

impl<K: Display> StructuredLog for VertexDiscoveryFailed<'_, K> {
    fn log(&self) {
        tracing::warn!(key = %self.key, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "vertex_discovery_failed",
            span_name = name,
            key = %self.key,
            error = %self.error,
        )
    }
}
