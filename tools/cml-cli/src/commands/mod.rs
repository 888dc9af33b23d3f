//! CLI command implementations.

pub mod config;
pub mod eval;

use clap::{Args, Subcommand};

/// Arguments for the eval command.
#[derive(Args)]
pub struct EvalArgs {
    /// Policy script to run.
    pub script: String,

    /// Request URI, including the query string.
    #[arg(short, long, default_value = "/")]
    pub uri: String,

    /// Cache base directory (overrides config).
    #[arg(long)]
    pub cache_dir: Option<String>,

    /// Cache base URL (overrides config).
    #[arg(long)]
    pub base_url: Option<String>,

    /// Document root reported to the script.
    #[arg(long)]
    pub document_root: Option<String>,

    /// Path info reported to the script.
    #[arg(long)]
    pub path_info: Option<String>,

    /// If-Modified-Since request header.
    #[arg(long)]
    pub if_modified_since: Option<String>,

    /// Last-Modified header set by an earlier stage.
    #[arg(long)]
    pub last_modified: Option<String>,

    /// Request method.
    #[arg(short, long, default_value = "GET")]
    pub method: String,

    /// Write the composed body to stdout instead of the report.
    #[arg(long)]
    pub body: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Validate the config file.
    Validate,
    /// Initialize a new config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}
