//! Policy script execution and output contract checks.

use std::path::Path;

use cml_core::{Decision, EngineConfig, EngineError, SandboxLimits, ScriptOutput};
use rhai::{Dynamic, Scope};

use crate::bindings::{names, ScriptEnvironment};
use crate::capabilities::Capabilities;
use crate::sandbox::{describe_eval_error, ScriptSandbox};

/// Runs policy scripts.
///
/// Holds only immutable configuration. Every call builds its own interpreter
/// and scope, which are dropped before returning on every path.
#[derive(Debug, Clone, Default)]
pub struct ScriptExecutor {
    capabilities: Capabilities,
    sandbox: ScriptSandbox,
}

impl ScriptExecutor {
    /// Create an executor with a capability set and no limits.
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            sandbox: ScriptSandbox::default(),
        }
    }

    /// Build an executor from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(Capabilities::from_toggles(&config.capabilities))
            .with_limits(config.sandbox.clone())
    }

    /// Set the interpreter limits.
    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.sandbox = ScriptSandbox::new(limits);
        self
    }

    /// The registered capabilities.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// The sandbox scripts run in.
    pub fn sandbox(&self) -> &ScriptSandbox {
        &self.sandbox
    }

    /// Load and run the script at `script`.
    pub fn execute(
        &self,
        script: &Path,
        env: &ScriptEnvironment,
    ) -> Result<ScriptOutput, EngineError> {
        let name = script.display().to_string();
        let source = std::fs::read_to_string(script).map_err(|err| EngineError::ScriptLoad {
            script: name.clone(),
            message: err.to_string(),
        })?;

        self.execute_source(&name, &source, env)
    }

    /// Run script source that is already in memory. `name` identifies it in errors.
    pub fn execute_source(
        &self,
        name: &str,
        source: &str,
        env: &ScriptEnvironment,
    ) -> Result<ScriptOutput, EngineError> {
        let mut engine = self.sandbox.build_engine();
        self.capabilities.register_all(&mut engine);

        let ast = engine.compile(source).map_err(|err| EngineError::ScriptLoad {
            script: name.to_string(),
            message: err.to_string(),
        })?;

        let mut scope = Scope::new();
        env.install(&mut scope);

        let returned = engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|err| EngineError::ScriptRuntime {
                script: name.to_string(),
                message: describe_eval_error(&err),
            })?;

        let output = read_outputs(name, returned, &scope)?;
        tracing::debug!(
            script = name,
            decision = %output.decision,
            includes = output.include_list.len(),
            handler = output.handler().unwrap_or(""),
            "policy script finished"
        );
        Ok(output)
    }
}

/// Check the output contract and collect the script's outputs.
///
/// The include list is checked before the returned decision, so a malformed
/// list forces an error whatever the script returned.
fn read_outputs(name: &str, returned: Dynamic, scope: &Scope<'_>) -> Result<ScriptOutput, EngineError> {
    let violation = |message: String| EngineError::ContractViolation {
        script: name.to_string(),
        message,
    };

    let include = scope
        .get_value::<Dynamic>(names::OUTPUT_INCLUDE)
        .unwrap_or(Dynamic::UNIT);
    let include_list = read_include_list(include).map_err(violation)?;

    let value = decision_value(&returned).map_err(violation)?;
    let decision = Decision::from_script_value(value);
    if decision == Decision::Error {
        return Err(EngineError::ScriptDecidedError {
            script: name.to_string(),
            value,
        });
    }

    let mut output = ScriptOutput::new(decision, include_list);
    if let Some(handler) = optional_string(scope, names::TRIGGER_HANDLER).map_err(violation)? {
        output = output.with_trigger_handler(handler);
    }
    if let Some(content_type) =
        optional_string(scope, names::OUTPUT_CONTENT_TYPE).map_err(violation)?
    {
        output = output.with_content_type(content_type);
    }
    Ok(output)
}

fn read_include_list(value: Dynamic) -> Result<Vec<String>, String> {
    if value.is_unit() {
        return Err(format!("`{}` was not set", names::OUTPUT_INCLUDE));
    }
    let type_name = value.type_name();
    let entries = value
        .into_array()
        .map_err(|_| format!("`{}` must be an array, got {type_name}", names::OUTPUT_INCLUDE))?;

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let type_name = entry.type_name();
            entry.into_string().map_err(|_| {
                format!(
                    "`{}[{index}]` must be a string, got {type_name}",
                    names::OUTPUT_INCLUDE
                )
            })
        })
        .collect()
}

// Floats are truncated toward zero.
fn decision_value(returned: &Dynamic) -> Result<i64, String> {
    if let Ok(value) = returned.as_int() {
        return Ok(value);
    }
    if let Ok(value) = returned.as_float() {
        if !value.is_finite() {
            return Err(format!("returned decision {value} is not a finite number"));
        }
        return Ok(value.trunc() as i64);
    }
    Err(format!(
        "script must return a number, got {}",
        returned.type_name()
    ))
}

fn optional_string(scope: &Scope<'_>, name: &str) -> Result<Option<String>, String> {
    let Some(value) = scope.get_value::<Dynamic>(name) else {
        return Ok(None);
    };
    if value.is_unit() {
        return Ok(None);
    }
    let type_name = value.type_name();
    value
        .into_string()
        .map(Some)
        .map_err(|_| format!("`{name}` must be a string, got {type_name}"))
}
