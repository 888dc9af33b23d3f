//! Failures that collapse a pass to the ERROR decision.

use serde::{Deserialize, Serialize};

/// Discriminant of an engine failure, used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ScriptLoad,
    ScriptRuntime,
    ScriptContractViolation,
    ScriptDecidedError,
    BackingFileMissingNoHandler,
    BackingFileStat,
    NoHandlerConfiguredForMiss,
}

impl FailureKind {
    /// Stable identifier for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScriptLoad => "script_load",
            Self::ScriptRuntime => "script_runtime",
            Self::ScriptContractViolation => "script_contract_violation",
            Self::ScriptDecidedError => "script_decided_error",
            Self::BackingFileMissingNoHandler => "backing_file_missing_no_handler",
            Self::BackingFileStat => "backing_file_stat",
            Self::NoHandlerConfiguredForMiss => "no_handler_configured_for_miss",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for an engine pass.
///
/// Every variant surfaces to the pipeline as the ERROR decision. A backing
/// file that is missing while a handler is configured is not an error; it
/// downgrades the pass to MISS instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("failed to load policy script '{script}': {message}")]
    ScriptLoad { script: String, message: String },

    #[error("policy script '{script}' failed: {message}")]
    ScriptRuntime { script: String, message: String },

    #[error("policy script '{script}' violated the output contract: {message}")]
    ContractViolation { script: String, message: String },

    #[error("policy script '{script}' returned error decision {value}")]
    ScriptDecidedError { script: String, value: i64 },

    #[error("backing file '{path}' is missing and no trigger handler is set")]
    BackingFileMissingNoHandler { path: String },

    #[error("failed to stat backing file '{path}': {message}")]
    BackingFileStat { path: String, message: String },

    #[error("policy script '{script}' reported a cache miss without a trigger handler")]
    NoHandlerConfiguredForMiss { script: String },
}

impl EngineError {
    /// Get the failure kind.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ScriptLoad { .. } => FailureKind::ScriptLoad,
            Self::ScriptRuntime { .. } => FailureKind::ScriptRuntime,
            Self::ContractViolation { .. } => FailureKind::ScriptContractViolation,
            Self::ScriptDecidedError { .. } => FailureKind::ScriptDecidedError,
            Self::BackingFileMissingNoHandler { .. } => FailureKind::BackingFileMissingNoHandler,
            Self::BackingFileStat { .. } => FailureKind::BackingFileStat,
            Self::NoHandlerConfiguredForMiss { .. } => FailureKind::NoHandlerConfiguredForMiss,
        }
    }

    /// The offending script identifier or backing file path.
    pub fn subject(&self) -> &str {
        match self {
            Self::ScriptLoad { script, .. }
            | Self::ScriptRuntime { script, .. }
            | Self::ContractViolation { script, .. }
            | Self::ScriptDecidedError { script, .. }
            | Self::NoHandlerConfiguredForMiss { script } => script,
            Self::BackingFileMissingNoHandler { path } | Self::BackingFileStat { path, .. } => path,
        }
    }
}
