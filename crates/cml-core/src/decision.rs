//! Tri-state cache decision and the policy script's outputs.

use serde::{Deserialize, Serialize};

/// Outcome of a policy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Serve the composed backing files.
    Hit,
    /// Delegate to the regeneration handler.
    Miss,
    /// Abort to the pipeline's generic failure handling.
    Error,
}

impl Decision {
    /// Numeric value scripts use for a cache hit.
    pub const HIT_VALUE: i64 = 0;
    /// Numeric value scripts use for a cache miss.
    pub const MISS_VALUE: i64 = 1;
    /// Numeric value of the error decision.
    pub const ERROR_VALUE: i64 = -1;

    /// Map a script's numeric return value to a decision.
    ///
    /// Anything other than the hit and miss values is an error.
    pub fn from_script_value(value: i64) -> Self {
        match value {
            Self::HIT_VALUE => Self::Hit,
            Self::MISS_VALUE => Self::Miss,
            _ => Self::Error,
        }
    }

    /// Numeric value of this decision.
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Hit => Self::HIT_VALUE,
            Self::Miss => Self::MISS_VALUE,
            Self::Error => Self::ERROR_VALUE,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss => write!(f, "MISS"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// What a successful policy script run produced.
///
/// Only constructed once the output contract holds: `include_list` was
/// present and every entry was a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOutput {
    /// Decision the script returned.
    pub decision: Decision,
    /// Handler path (relative to the cache base) used on a miss.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_handler: Option<String>,
    /// Content type to announce when serving from the cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_content_type: Option<String>,
    /// Backing files, relative to the cache base, in script order.
    pub include_list: Vec<String>,
}

impl ScriptOutput {
    /// Create an output with a decision and include list.
    pub fn new(decision: Decision, include_list: Vec<String>) -> Self {
        Self {
            decision,
            trigger_handler: None,
            output_content_type: None,
            include_list,
        }
    }

    /// Set the trigger handler. An empty handler counts as none.
    pub fn with_trigger_handler(mut self, handler: impl Into<String>) -> Self {
        let handler = handler.into();
        self.trigger_handler = if handler.is_empty() { None } else { Some(handler) };
        self
    }

    /// Set the output content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.output_content_type = Some(content_type.into());
        self
    }

    /// The trigger handler, if a non-empty one was set.
    pub fn handler(&self) -> Option<&str> {
        self.trigger_handler.as_deref().filter(|h| !h.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_from_script_value() {
        assert_eq!(Decision::from_script_value(0), Decision::Hit);
        assert_eq!(Decision::from_script_value(1), Decision::Miss);
        assert_eq!(Decision::from_script_value(-1), Decision::Error);
        assert_eq!(Decision::from_script_value(2), Decision::Error);
    }

    #[test]
    fn test_decision_round_values() {
        for decision in [Decision::Hit, Decision::Miss, Decision::Error] {
            assert_eq!(Decision::from_script_value(decision.as_i64()), decision);
        }
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(Decision::Hit.to_string(), "HIT");
        assert_eq!(Decision::Miss.to_string(), "MISS");
        assert_eq!(Decision::Error.to_string(), "ERROR");
    }

    #[test]
    fn test_empty_handler_is_none() {
        let output = ScriptOutput::new(Decision::Miss, vec![]).with_trigger_handler("");
        assert_eq!(output.handler(), None);

        let output = output.with_trigger_handler("/gen.rhai");
        assert_eq!(output.handler(), Some("/gen.rhai"));
    }
}
