//! CLI execution context.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use cml_core::EngineConfig;

use crate::output::Output;

/// Config file names searched for, in order.
pub const CONFIG_NAMES: [&str; 3] = ["cml.toml", ".cml.toml", "cml.json"];

/// Execution context for CLI commands.
pub struct Context {
    /// Config file in use, if any.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
    /// Working directory.
    pub cwd: PathBuf,
}

impl Context {
    /// Locate the config file. It is only read when a command needs it.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let config_path = match config_path {
            Some(path) => Some(resolve(&cwd, path)),
            None => find_config(&cwd),
        };
        if let Some(path) = &config_path {
            output.debug(&format!("Using config: {}", path.display()));
        }

        Ok(Self {
            config_path,
            output,
            cwd,
        })
    }

    /// Read and validate the config file, if one was found.
    pub fn engine_config(&self) -> Result<Option<EngineConfig>> {
        self.config_path
            .as_ref()
            .map(EngineConfig::load)
            .transpose()
    }

    /// Resolve a path relative to the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        resolve(&self.cwd, path)
    }
}

fn resolve(cwd: &Path, path: &str) -> PathBuf {
    if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        cwd.join(path)
    }
}

/// Find a config file in `start` or any parent directory.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        for name in CONFIG_NAMES {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}
