// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Concurrent directed-acyclic-graph engine for Open Component Model (OCM) component
//! dependency graphs.
//!
//! Four cooperating pieces, leaves-first:
//!
//! * [`store`] - the in-memory DAG itself: vertices, edges, attributes, cycle prevention.
//! * [`concurrency`] - a single reader/writer lock wrapped around the store.
//! * [`discover`] - concurrent expansion of the graph from a set of roots via caller-supplied
//!   `Resolver`/`NeighborDiscoverer` callbacks.
//! * [`process`] - bounded-concurrency traversal of a built graph in topological order via a
//!   caller-supplied `VertexProcessor` callback.
//!
//! The OCM descriptor/runtime type system, plugin manager, repository backends, and CLI/config
//! wiring that surround this engine in the full toolchain are external collaborators; this crate
//! only owns the contracts in [`discover`] and [`process`] that they plug into.

pub mod concurrency;
pub mod discover;
pub mod errors;
pub mod observability;
pub mod process;
pub mod store;

pub use concurrency::ConcurrentDag;
pub use discover::{DiscovererConfig, GraphDiscoverer, NeighborDiscoverer, Resolver};
pub use errors::GraphError;
pub use process::{ProcessorConfig, TopologicalProcessor, VertexProcessor};
pub use store::{Dag, DiscoveryState, ProcessingState};
