//! Core abstractions for the cache composition engine.
//!
//! This crate provides the fundamental types and traits:
//! - `RequestContext` - Read-only request facts handed to the policy script
//! - `Decision` / `ScriptOutput` - What a policy script produced
//! - `CompositionResult` - Body segments, freshness and the applied outcome
//! - `EngineError` / `FailureKind` - Failures that collapse to ERROR
//! - `EngineConfig` - Cache base directory/URL, sandbox and capability settings
//! - `ServingPipeline` - The request/response surface the engine writes to

mod composition;
mod config;
mod context;
mod decision;
mod error;
mod lifecycle;
mod pipeline;
mod query;

pub use composition::*;
pub use config::*;
pub use context::*;
pub use decision::*;
pub use error::*;
pub use lifecycle::*;
pub use pipeline::*;
pub use query::*;
