//! Script-driven cache decision and composition.
//!
//! This crate provides:
//! - `CacheEngine` - Runs a policy script and applies its decision to a pipeline
//! - `FreshnessValidator` - Checks backing files in include order
//! - `ConditionalResolver` / `HttpConditional` - Last-Modified and conditional GET
//! - `MissRedirector` - Internal re-dispatch to the regeneration handler
//! - `BackingStore` - Stat access to backing files
//!
//! # Example
//!
//! ```ignore
//! use cml_core::{EngineConfig, MemoryPipeline};
//! use cml_engine::CacheEngine;
//!
//! let engine = CacheEngine::new(EngineConfig::new("/srv/cache/", "/cache/"));
//! let ctx = engine.request_context("/news/?page=2");
//! let mut pipeline = MemoryPipeline::new("/news/index.cml", "/srv/www/news/index.cml");
//!
//! let result = engine.run(&ctx, "/srv/www/news/index.rhai".as_ref(), &mut pipeline);
//! println!("{} {}", result.decision, result.aggregated_mtime);
//! ```

mod conditional;
mod engine;
mod http_date;
mod redirect;
mod resolver;
mod store;
mod validator;

pub use conditional::*;
pub use engine::*;
pub use http_date::*;
pub use redirect::*;
pub use resolver::*;
pub use store::*;
pub use validator::*;
