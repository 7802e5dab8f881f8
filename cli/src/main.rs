// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Agent Supervisor CLI
//!
//! The `agent-supervisor` binary keeps the traffic capture agent container
//! running and matching its stored configuration.
//!
//! ## Commands
//!
//! - `agent-supervisor run` - Reconcile in the foreground until Ctrl-C
//! - `agent-supervisor status|restart|stop` - One-shot agent operations
//! - `agent-supervisor config show|set|delete|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use agent_supervisor_core::domain::supervisor_config::{LogFormat, SupervisorConfig};

mod commands;

use commands::ConfigCommand;

const LOAD_FAILED: &str = "Failed to load configuration";

/// Agent Supervisor - Keep the capture agent container reconciled
#[derive(Parser)]
#[command(name = "agent-supervisor")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "AGENT_SUPERVISOR_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level.
    #[arg(long, global = true, env = "AGENT_SUPERVISOR_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent and keep it reconciled until interrupted
    #[command(name = "run")]
    Run,

    /// Show the agent container and stored configuration
    #[command(name = "status")]
    Status,

    /// Recreate the agent container
    #[command(name = "restart")]
    Restart,

    /// Remove the agent container and delete its configuration
    #[command(name = "stop")]
    Stop,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when it parses; config
    // commands still need to run against a broken file.
    let loaded = SupervisorConfig::load_or_default(cli.config.clone());
    let (level, format) = match &loaded {
        Ok(config) => (
            cli.log_level.clone().unwrap_or_else(|| config.observability.log_level.clone()),
            config.observability.log_format,
        ),
        Err(_) => (cli.log_level.clone().unwrap_or_else(|| "info".to_string()), LogFormat::Compact),
    };
    init_logging(&level, format)?;

    let command = match cli.command {
        Some(command) => command,
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    };

    match command {
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
        Commands::Run => commands::agent::run(&loaded.context(LOAD_FAILED)?).await,
        Commands::Status => commands::agent::status(&loaded.context(LOAD_FAILED)?).await,
        Commands::Restart => commands::agent::restart(&loaded.context(LOAD_FAILED)?).await,
        Commands::Stop => commands::agent::stop(&loaded.context(LOAD_FAILED)?).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
