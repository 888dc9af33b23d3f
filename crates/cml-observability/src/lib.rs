//! Observability infrastructure for the cache composition engine.
//!
//! This crate provides:
//! - `Diagnostic` - One structured event per failure or decision downgrade
//! - `DiagnosticSink` - Where diagnostics go (`TracingSink`, `RecordingSink`)
//! - `init_subscriber` - Global `tracing` subscriber setup for binaries

mod diagnostic;
mod logging;

pub use diagnostic::*;
pub use logging::*;

// Re-export from cml-core for convenience
pub use cml_core::{FailureKind, RequestId};
