// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error taxonomy for the DAG store, discoverer, and processor.
//!
//! Structural errors (`CycleViolation`, `SelfReference`, `MissingVertex`) are programmer
//! errors surfaced without retry. Callback errors (`ResolverFailure`, `DiscovererFailure`,
//! `ProcessorFailure`) wrap whatever the caller's capability returned, annotated with the
//! offending key, so the original error remains reachable through `source()`.

/// Everything that can go wrong while building or traversing a [`crate::Dag`].
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Inserting this edge would create a cycle. `path` is the concrete cycle, from `to`
    /// back around to `from`, formatted for diagnostics.
    #[error("adding edge would create a cycle: {}", path.join(" -> "))]
    CycleViolation { path: Vec<String> },

    /// `AddEdge(from, to)` was called with `from == to`.
    #[error("self-reference: vertex {id} cannot have an edge to itself")]
    SelfReference { id: String },

    /// An operation referenced a vertex id that is not present in the store.
    #[error("missing vertex: {id} is not present in the graph")]
    MissingVertex { id: String },

    /// Reserved for callers layering stricter identity checks on top of `AddVertex`; the
    /// store itself always merges duplicate inserts benignly and never raises this.
    #[error("vertex {id} already exists with a conflicting identity")]
    AlreadyExists { id: String },

    /// `Discover` was invoked with an empty root set.
    #[error("discovery requires at least one root")]
    NoRoots,

    /// The driving context ended before the operation completed.
    #[error("operation cancelled")]
    Cancelled,

    /// `Resolver::resolve` failed for the given key.
    #[error("resolver failed for {key}: {source}")]
    ResolverFailure {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `NeighborDiscoverer::discover` failed for the given key.
    #[error("neighbor discovery failed for {key}: {source}")]
    DiscovererFailure {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `VertexProcessor::process` failed for the given key.
    #[error("processing failed for {key}: {source}")]
    ProcessorFailure {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `ProcessTopology` finished but the working copy still held vertices. This indicates
    /// an invariant breach (a cycle that slipped past `AddEdge`, most likely).
    #[error("processing finished but {remaining} vertices were never reached")]
    UnprocessedRemainder { remaining: usize },

    /// A callback or internal step panicked; recovered at the `Discover`/`ProcessTopology`
    /// boundary and surfaced here instead of unwinding past the library edge.
    #[error("panic recovered during {phase}: {message}")]
    Panic { phase: &'static str, message: String },
}

impl GraphError {
    pub fn resolver_failure(
        key: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        GraphError::ResolverFailure {
            key: key.into(),
            source: Box::new(source),
        }
    }

    pub fn discoverer_failure(
        key: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        GraphError::DiscovererFailure {
            key: key.into(),
            source: Box::new(source),
        }
    }

    pub fn processor_failure(
        key: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        GraphError::ProcessorFailure {
            key: key.into(),
            source: Box::new(source),
        }
    }

    /// True for the structural, programmer-error class of failure (never a callback's fault).
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            GraphError::CycleViolation { .. }
                | GraphError::SelfReference { .. }
                | GraphError::MissingVertex { .. }
                | GraphError::AlreadyExists { .. }
        )
    }
}
