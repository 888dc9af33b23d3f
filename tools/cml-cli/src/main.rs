//! CML CLI - Run cache policy scripts outside a server.
//!
//! Commands:
//! - `cml eval` - Run one decision and composition pass
//! - `cml config` - Manage configuration

mod commands;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cml_observability::{init_subscriber, LogFormat};

use commands::{ConfigArgs, EvalArgs};

/// CML CLI - Evaluate cache policy scripts against a cache directory
#[derive(Parser)]
#[command(name = "cml")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a policy script for one request
    Eval(EvalArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json { LogFormat::Json } else { LogFormat::Human };
    let directive = if cli.verbose { "debug" } else { "warn" };
    init_subscriber(format, directive)?;

    let output = output::Output::new(cli.verbose, cli.json);
    let ctx = context::Context::load(cli.config.as_deref(), output)?;

    let result = match cli.command {
        Commands::Eval(args) => commands::eval::run(args, &ctx),
        Commands::Config(args) => commands::config::run(args, &ctx),
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
