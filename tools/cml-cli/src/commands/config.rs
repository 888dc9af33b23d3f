//! Configuration management commands.

use anyhow::{bail, Context as _, Result};
use cml_core::EngineConfig;

use super::{ConfigArgs, ConfigCommand};
use crate::context::{Context, CONFIG_NAMES};

/// Run the config command.
pub fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx),
        ConfigCommand::Validate => validate_config(ctx),
        ConfigCommand::Init { force } => init_config(force, ctx),
    }
}

fn require_config(ctx: &Context) -> Result<EngineConfig> {
    match ctx.engine_config()? {
        Some(config) => Ok(config),
        None => bail!("No config file found. Run `cml config init` to create one."),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    let config = require_config(ctx)?;

    if ctx.output.is_json() {
        ctx.output.json(&config);
        return Ok(());
    }

    if let Some(path) = &ctx.config_path {
        ctx.output.header(&format!("Configuration ({})", path.display()));
    }
    ctx.output.kv("cache_base_dir", &config.cache_base_dir);
    ctx.output.kv("cache_base_url", &config.cache_base_url);

    ctx.output.info("[sandbox]");
    let limits = &config.sandbox;
    let show = |v: Option<String>| v.unwrap_or_else(|| "unbounded".to_string());
    ctx.output
        .kv("max_operations", &show(limits.max_operations.map(|v| v.to_string())));
    ctx.output.kv("timeout_ms", &show(limits.timeout_ms.map(|v| v.to_string())));
    ctx.output.kv(
        "max_call_depth",
        &limits
            .max_call_depth
            .map(|v| v.to_string())
            .unwrap_or_else(|| "default".to_string()),
    );
    ctx.output
        .kv("max_string_size", &show(limits.max_string_size.map(|v| v.to_string())));
    ctx.output
        .kv("max_array_size", &show(limits.max_array_size.map(|v| v.to_string())));
    ctx.output
        .kv("max_map_size", &show(limits.max_map_size.map(|v| v.to_string())));

    ctx.output.info("[capabilities]");
    ctx.output.kv("filesystem", &config.capabilities.filesystem.to_string());
    ctx.output.kv("hash", &config.capabilities.hash.to_string());

    Ok(())
}

fn validate_config(ctx: &Context) -> Result<()> {
    let config = require_config(ctx)?;

    if !config.cache_base_dir.ends_with('/') {
        ctx.output.warn(
            "cache_base_dir does not end with '/'; include paths are appended to it as-is",
        );
    }
    if !config.cache_base_url.is_empty() && !config.cache_base_url.ends_with('/') {
        ctx.output
            .warn("cache_base_url does not end with '/'; handlers are appended to it as-is");
    }
    if !std::path::Path::new(&config.cache_base_dir).is_dir() {
        ctx.output.warn(&format!(
            "cache_base_dir '{}' is not a directory",
            config.cache_base_dir
        ));
    }

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "valid": true }));
    }
    ctx.output.success("Configuration is valid");
    Ok(())
}

fn init_config(force: bool, ctx: &Context) -> Result<()> {
    let config_path = ctx.cwd.join(CONFIG_NAMES[0]);

    if config_path.exists() && !force {
        bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let cache_dir = ctx.cwd.join("cache");
    let config = EngineConfig::new(format!("{}/", cache_dir.display()), "/cache/");
    config
        .save(&config_path)
        .with_context(|| format!("Failed to create {}", config_path.display()))?;

    ctx.output
        .success(&format!("Created: {}", config_path.display()));
    Ok(())
}
