//! teleq CLI - Command-line interface for the offline telemetry queue
//!
//! Provides commands for:
//! - Enqueuing events and inspecting the queue
//! - Applying the retention policy
//! - Classifying device conditions into a telemetry mode
//! - Exporting queued events through a real flush cycle
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use teleq_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    completions::CompletionsCommand, config::ConfigCommand, enqueue::EnqueueCommand,
    export::ExportCommand, mode::ModeCommand, peek::PeekCommand, prune::PruneCommand,
    stats::StatsCommand, CommandContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "teleq", version, about = "Offline telemetry queue toolkit")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Store a telemetry event in the queue
    Enqueue(EnqueueCommand),
    /// Show queue statistics
    Stats(StatsCommand),
    /// List the next events in flush order without removing them
    Peek(PeekCommand),
    /// Apply the retention policy (age limit and size cap)
    Prune(PruneCommand),
    /// Classify device conditions into a telemetry mode
    Mode(ModeCommand),
    /// Flush queued events into a JSON Lines file
    Export(ExportCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    init_tracing(&cli, &config);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CommandContext::new(format, cli.quiet, config_path, config);

    match cli.command {
        Commands::Enqueue(cmd) => cmd.execute(&ctx).await,
        Commands::Stats(cmd) => cmd.execute(&ctx).await,
        Commands::Peek(cmd) => cmd.execute(&ctx).await,
        Commands::Prune(cmd) => cmd.execute(&ctx).await,
        Commands::Mode(cmd) => cmd.execute(&ctx).await,
        Commands::Export(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
        Commands::Completions(cmd) => cmd.execute(&ctx).await,
    }
}

/// Installs the tracing subscriber
///
/// `RUST_LOG` wins; otherwise `-v`/`-q` override the configured level.
/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(cli: &Cli, config: &Config) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => config.logging.level.as_str(),
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
