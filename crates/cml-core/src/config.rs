//! Engine configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Immutable engine configuration shared by all passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory backing files and handlers are resolved against.
    ///
    /// Joined by plain concatenation, so it normally ends with a separator.
    pub cache_base_dir: String,

    /// URL prefix the regeneration handler is reached under.
    #[serde(default)]
    pub cache_base_url: String,

    /// Interpreter limits for policy scripts.
    #[serde(default)]
    pub sandbox: SandboxLimits,

    /// Host capabilities exposed to policy scripts.
    #[serde(default)]
    pub capabilities: CapabilityToggles,
}

impl EngineConfig {
    /// Create a config for a cache base directory and URL.
    pub fn new(cache_base_dir: impl Into<String>, cache_base_url: impl Into<String>) -> Self {
        Self {
            cache_base_dir: cache_base_dir.into(),
            cache_base_url: cache_base_url.into(),
            sandbox: SandboxLimits::default(),
            capabilities: CapabilityToggles::default(),
        }
    }

    /// Set the sandbox limits.
    pub fn with_sandbox(mut self, sandbox: SandboxLimits) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Set the capability toggles.
    pub fn with_capabilities(mut self, capabilities: CapabilityToggles) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Load config from a file. `.json` files are JSON, anything else TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_json(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
        };

        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    /// Save config to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_base_dir.is_empty() {
            return Err(ConfigError::MissingCacheBaseDir);
        }
        self.sandbox.validate()
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// Interpreter limits applied to each policy script run.
///
/// Every limit is off by default, matching an unbounded interpreter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxLimits {
    /// Maximum number of interpreter operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_operations: Option<u64>,
    /// Wall-clock budget in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Maximum function call depth. `None` keeps the interpreter default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_call_depth: Option<usize>,
    /// Maximum length of a string value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_string_size: Option<usize>,
    /// Maximum number of array elements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_array_size: Option<usize>,
    /// Maximum number of map entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_map_size: Option<usize>,
}

impl SandboxLimits {
    /// No limits.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Limits suitable for untrusted policy authors.
    pub fn strict() -> Self {
        Self {
            max_operations: Some(100_000),
            timeout_ms: Some(50),
            max_call_depth: Some(32),
            max_string_size: Some(64 * 1024),
            max_array_size: Some(4096),
            max_map_size: Some(4096),
        }
    }

    /// Set the operation budget.
    pub fn with_max_operations(mut self, max: u64) -> Self {
        self.max_operations = Some(max);
        self
    }

    /// Set the wall-clock budget in milliseconds.
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Validate the limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_operations == Some(0) {
            return Err(ConfigError::ZeroLimit("max_operations"));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::ZeroLimit("timeout_ms"));
        }
        if self.max_call_depth == Some(0) {
            return Err(ConfigError::ZeroLimit("max_call_depth"));
        }
        Ok(())
    }
}

/// Which built-in host capabilities policy scripts may call.
///
/// Everything is off unless enabled, so scripts start without I/O.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityToggles {
    /// `file_mtime`, `file_is_regular`, `file_is_dir`, `dir_files`.
    #[serde(default)]
    pub filesystem: bool,
    /// `hash`.
    #[serde(default)]
    pub hash: bool,
}

impl CapabilityToggles {
    /// No built-in capabilities.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every built-in capability.
    pub fn all() -> Self {
        Self {
            filesystem: true,
            hash: true,
        }
    }
}

/// Errors in engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("cache_base_dir must not be empty")]
    MissingCacheBaseDir,

    #[error("sandbox limit '{0}' must be greater than 0 when set")]
    ZeroLimit(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_toml() {
        let config: EngineConfig = toml::from_str(r#"cache_base_dir = "/srv/cache/""#).unwrap();
        assert_eq!(config.cache_base_dir, "/srv/cache/");
        assert_eq!(config.cache_base_url, "");
        assert_eq!(config.sandbox, SandboxLimits::unbounded());
        assert_eq!(config.capabilities, CapabilityToggles::none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            cache_base_dir = "/srv/cache/"
            cache_base_url = "/cache/"

            [sandbox]
            max_operations = 5000
            timeout_ms = 20

            [capabilities]
            filesystem = true
            "#,
        )
        .unwrap();
        assert_eq!(config.sandbox.max_operations, Some(5000));
        assert_eq!(config.sandbox.timeout_ms, Some(20));
        assert!(config.capabilities.filesystem);
        assert!(!config.capabilities.hash);
    }

    #[test]
    fn test_validate_rejects_empty_base_dir() {
        let config = EngineConfig::new("", "/cache/");
        assert_eq!(config.validate(), Err(ConfigError::MissingCacheBaseDir));
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let config = EngineConfig::new("/c/", "/")
            .with_sandbox(SandboxLimits::default().with_max_operations(0));
        assert_eq!(config.validate(), Err(ConfigError::ZeroLimit("max_operations")));
        assert!(SandboxLimits::strict().validate().is_ok());
    }

    #[test]
    fn test_save_and_load_toml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new("/srv/cache/", "/cache/")
            .with_sandbox(SandboxLimits::strict())
            .with_capabilities(CapabilityToggles::all());

        let toml_path = dir.path().join("cml.toml");
        config.save(&toml_path).unwrap();
        assert_eq!(EngineConfig::load(&toml_path).unwrap(), config);

        let json_path = dir.path().join("cml.json");
        config.save(&json_path).unwrap();
        assert_eq!(EngineConfig::load(&json_path).unwrap(), config);
    }

    #[test]
    fn test_load_invalid_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cml.toml");
        std::fs::write(&path, "cache_base_dir = \"\"").unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
