//! Policy script execution for the cache composition engine.
//!
//! This crate provides:
//! - `ScriptEnvironment` - The read-only namespace a policy script sees
//! - `Capabilities` / `HostCapability` - Host callables injected per executor
//! - `ScriptExecutor` - Loads and runs a policy script in a fresh sandbox
//!
//! # Example
//!
//! ```ignore
//! use cml_core::{RequestContext, SandboxLimits};
//! use cml_script::{Capabilities, ScriptEnvironment, ScriptExecutor};
//!
//! let executor = ScriptExecutor::new(Capabilities::new().with_filesystem())
//!     .with_limits(SandboxLimits::strict());
//!
//! let ctx = RequestContext::new("/news/?page=2").with_cache_base("/srv/cache/", "/cache/");
//! let env = ScriptEnvironment::bind(&ctx);
//! let output = executor.execute(std::path::Path::new("/srv/cache/index.rhai"), &env)?;
//! ```

mod bindings;
mod capabilities;
mod executor;
mod sandbox;

pub use bindings::*;
pub use capabilities::*;
pub use executor::*;
pub use sandbox::*;
