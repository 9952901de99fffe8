// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! A message is a small struct with a `Display` impl and a `log`/`span` pair, so call sites
//! read `SomeEvent { .. }.log()` instead of a bespoke format string scattered through the code.
//!
//! * `discovery` - `GraphDiscoverer` lifecycle and per-vertex events.
//! * `processing` - `TopologicalProcessor` lifecycle and per-vertex events.

pub mod discovery;
pub mod processing;

use tracing::Span;

/// Implemented by every message type. `log` emits the event at the level the message itself
/// decides; `span` opens a span carrying the same fields, for call sites that want to scope
/// subsequent log lines under this event rather than just emit one line for it.
pub trait StructuredLog {
    fn log(&self);
    fn span(&self, name: &str) -> Span;
}
