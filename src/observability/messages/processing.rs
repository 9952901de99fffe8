// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for [`crate::process::TopologicalProcessor`] lifecycle and per-vertex events.

use std::fmt::{Display, Formatter};

use tracing::Span;

use crate::observability::messages::StructuredLog;

/// A processing run started with the given frontier size and direction.
///
/// # Log Level
/// `info!`
pub struct ProcessingStarted {
    pub vertex_count: usize,
    pub reverse: bool,
}

impl Display for ProcessingStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "starting {} processing of {} vertex(es)",
            if self.reverse { "reverse-topological" } else { "topological" },
            self.vertex_count
        )
    }
}

impl StructuredLog for ProcessingStarted {
    fn log(&self) {
        tracing::info!(vertex_count = self.vertex_count, reverse = self.reverse, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "processing",
            span_name = name,
            vertex_count = self.vertex_count,
            reverse = self.reverse,
        )
    }
}

/// A processing run walked every vertex without error.
///
/// # Log Level
/// `info!`
pub struct ProcessingCompleted;

impl Display for ProcessingCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "processing completed")
    }
}

impl StructuredLog for ProcessingCompleted {
    fn log(&self) {
        tracing::info!("{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("processing_completed", span_name = name)
    }
}

/// A processing run aborted with an error.
///
/// # Log Level
/// `error!`
pub struct ProcessingFailed<'a> {
    pub error: &'a dyn std::error::Error,
}

impl Display for ProcessingFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "processing failed: {}", self.error)
    }
}

impl StructuredLog for ProcessingFailed<'_> {
    fn log(&self) {
        tracing::error!(error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("processing_failed", span_name = name, error = %self.error)
    }
}

/// A vertex entered its frontier and was marked `Queued`.
///
/// # Log Level
/// `debug!`
pub struct VertexQueued<'a, K: Display> {
    pub key: &'a K,
}

impl<K: Display> Display for VertexQueued<'_, K> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "vertex {} queued", self.key)
    }
}

impl<K: Display> StructuredLog for VertexQueued<'_, K> {
    fn log(&self) {
        tracing::debug!(key = %self.key, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("vertex_queued", span_name = name, key = %self.key)
    }
}

/// `Process` was invoked for a vertex.
///
/// # Log Level
/// `debug!`
pub struct VertexProcessing<'a, K: Display> {
    pub key: &'a K,
}

impl<K: Display> Display for VertexProcessing<'_, K> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "processing vertex {}", self.key)
    }
}

impl<K: Display> StructuredLog for VertexProcessing<'_, K> {
    fn log(&self) {
        tracing::debug!(key = %self.key, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("vertex_processing", span_name = name, key = %self.key)
    }
}

/// A single vertex finished `Process` successfully.
///
/// # Log Level
/// `debug!`
pub struct VertexProcessingCompleted<'a, K: Display> {
    pub key: &'a K,
}

impl<K: Display> Display for VertexProcessingCompleted<'_, K> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "vertex {} processed", self.key)
    }
}

impl<K: Display> StructuredLog for VertexProcessingCompleted<'_, K> {
    fn log(&self) {
        tracing::debug!(key = %self.key, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("vertex_processing_completed", span_name = name, key = %self.key)
    }
}

/// `Process` failed for a single vertex.
///
/// # Log Level
/// `warn!`
pub struct VertexProcessingFailed<'a, K: Display> {
    pub key: &'a K,
    pub error: &'a dyn std::error::Error,
}

impl<K: Display> Display for VertexProcessingFailed<'_, K> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "vertex {} failed processing: {}", self.key, self.error)
    }
}

impl<K: Display> StructuredLog for VertexProcessingFailed<'_, K> {
    fn log(&self) {
        tracing::warn!(key = %self.key, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "vertex_processing_failed",
            span_name = name,
            key = %self.key,
            error = %self.error,
        )
    }
}
