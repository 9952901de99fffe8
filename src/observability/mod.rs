// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Structured logging for the discovery and processing engines.
//!
//! Message types follow a struct-based pattern with a `Display` impl, so log call sites
//! read `tracing::debug!("{}", msg)` instead of accumulating ad hoc format strings. Messages
//! are organized by subsystem:
//!
//! * `messages::discovery` - `GraphDiscoverer` lifecycle and per-vertex events.
//! * `messages::processing` - `TopologicalProcessor` lifecycle and per-vertex events.
//!
//! This crate never installs a global subscriber itself; callers wire up
//! `tracing-subscriber`'s `fmt` + `env-filter` layers as they see fit.

pub mod messages;
