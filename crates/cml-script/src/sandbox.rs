//! Interpreter construction and execution limits for policy scripts.

use std::time::{Duration, Instant};

use cml_core::SandboxLimits;
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult};

/// Builds the locked-down interpreter a single pass runs in.
///
/// Each call to [`ScriptSandbox::build_engine`] returns a brand new engine, so
/// nothing a script does can leak into another request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptSandbox {
    limits: SandboxLimits,
}

impl ScriptSandbox {
    /// Create a sandbox with the given limits.
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    /// The configured limits.
    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// A fresh engine with no module loading, no `eval`, logging hooks and
    /// the configured limits applied.
    pub fn build_engine(&self) -> Engine {
        let mut engine = Engine::new();

        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");

        engine.on_print(|text| tracing::info!(target: "cml_script::print", "{}", text));
        engine.on_debug(|text, source, pos| {
            tracing::debug!(
                target: "cml_script::debug",
                source = source.unwrap_or(""),
                position = %pos,
                "{}",
                text
            )
        });

        self.apply(&mut engine);
        engine
    }

    /// Apply the limits to an existing engine.
    ///
    /// The wall-clock budget starts counting when this is called.
    pub fn apply(&self, engine: &mut Engine) {
        let limits = &self.limits;

        if let Some(max) = limits.max_operations {
            engine.set_max_operations(max);
        }
        if let Some(depth) = limits.max_call_depth {
            engine.set_max_call_levels(depth);
        }
        if let Some(size) = limits.max_string_size {
            engine.set_max_string_size(size);
        }
        if let Some(size) = limits.max_array_size {
            engine.set_max_array_size(size);
        }
        if let Some(size) = limits.max_map_size {
            engine.set_max_map_size(size);
        }

        if let Some(ms) = limits.timeout_ms {
            let budget = Duration::from_millis(ms);
            let started = Instant::now();
            engine.on_progress(move |_ops| {
                if started.elapsed() > budget {
                    Some(Dynamic::from(ms as rhai::INT))
                } else {
                    None
                }
            });
        }
    }
}

/// Render an interpreter error for diagnostics.
///
/// Terminations raised by the wall-clock budget get a readable message; every
/// other error uses the interpreter's own text.
pub fn describe_eval_error(err: &EvalAltResult) -> String {
    match err {
        EvalAltResult::ErrorTerminated(token, pos) => match token.as_int() {
            Ok(ms) => format!("script exceeded its {ms}ms time budget ({pos})"),
            Err(_) => format!("script terminated ({pos})"),
        },
        other => other.to_string(),
    }
}
