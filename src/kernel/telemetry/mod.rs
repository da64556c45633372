//! Engine instrumentation.
//!
//! # INVARIANT
//! This is a write-only side layer: the evaluator never reads it back when deciding
//! whether to fire. It exists for logs, stats, and the event stream.

pub mod event;
pub mod metrics;
pub mod recorder;
