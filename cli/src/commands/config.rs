// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, set, delete, validate, generate

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use agent_supervisor_core::application::factory::{create_config_store, create_engine};
use agent_supervisor_core::domain::agent::{AgentConfiguration, API_KEY_ENV, API_SECRET_ENV};
use agent_supervisor_core::domain::supervisor_config::{ConfigStoreSettings, SupervisorConfig, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show supervisor settings and the stored agent configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Replace the stored agent configuration
    Set(SetArgs),

    /// Delete the stored agent configuration
    Delete,

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./agent-supervisor.yaml)
        #[arg(short, long, default_value = "./agent-supervisor.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
pub struct SetArgs {
    /// API key id
    #[arg(long, env = API_KEY_ENV)]
    api_key: String,

    /// API key secret
    #[arg(long, env = API_SECRET_ENV, hide_env_values = true)]
    api_secret: String,

    /// Project the captured traffic is reported to
    #[arg(long)]
    project: String,

    /// Capture only traffic on this port
    #[arg(long)]
    port: Option<u16>,

    /// Capture traffic of this container instead of the host (takes precedence over --port)
    #[arg(long)]
    container: Option<String>,

    /// Store the configuration without enabling the agent
    #[arg(long)]
    disabled: bool,

    /// Recreate the agent with the new configuration right away
    #[arg(long)]
    apply: bool,
}

impl SetArgs {
    fn to_configuration(&self) -> AgentConfiguration {
        let mut config = AgentConfiguration::new(&self.api_key, &self.api_secret, &self.project);
        if let Some(port) = self.port {
            config = config.with_target_port(port);
        }
        if let Some(container) = &self.container {
            config = config.with_target_container(container);
        }
        if self.disabled {
            config = config.disabled();
        }
        config
    }
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Set(args) => set(config_override, args).await,
        ConfigCommand::Delete => delete(config_override).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(&output, force).await,
    }
}

pub(crate) fn print_agent_configuration(agent: &AgentConfiguration) {
    println!("  Project: {}", agent.project_name);
    println!("  API key: {}", agent.api_key);
    println!("  API secret: {}", "********".dimmed());
    match (&agent.target_container, agent.target_port) {
        (Some(container), _) => println!("  Capture: container {}", container),
        (None, Some(port)) => println!("  Capture: port {}", port),
        (None, None) => println!("  Capture: {}", "all host traffic".yellow()),
    }
    if agent.enabled {
        println!("  Enabled: {}", "yes".green());
    } else {
        println!("  Enabled: {}", "no".dimmed());
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = SupervisorConfig::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  --config flag: {}", path.display());
        } else {
            println!("  --config flag: {}", "(not set)".dimmed());
        }
        for (i, path) in SupervisorConfig::search_paths().iter().enumerate() {
            let marker = if path.exists() { "✓".green() } else { "-".dimmed() };
            println!("  {}. {} {}", i + 1, marker, path.display());
        }
        println!(
            "  {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!();
    }

    println!("{}", "Supervisor:".bold());
    println!("  Runtime: {:?}", config.runtime.backend);
    if let Some(socket) = &config.runtime.docker_socket_path {
        println!("  Docker socket: {}", socket);
    }
    match &config.config_store {
        ConfigStoreSettings::File { path } => println!("  Config store: file {}", path.display()),
        ConfigStoreSettings::Http { base_url, timeout_ms } => {
            println!("  Config store: {} (timeout {}ms)", base_url, timeout_ms)
        }
    }
    let r = &config.reconciliation;
    println!("  Poll interval: {}ms", r.poll_interval_ms);
    println!("  Launch attempts: {} every {}ms", r.launch_attempts, r.launch_delay_ms);
    println!("  Confirm attempts: {} every {}ms", r.confirm_attempts, r.confirm_delay_ms);
    match config.observability.metrics_port {
        Some(port) => println!("  Metrics: :{}", port),
        None => println!("  Metrics: {}", "(disabled)".dimmed()),
    }
    println!();

    println!("{}", "Agent configuration:".bold());
    let store = create_config_store(&config.config_store).context("Failed to initialize configuration store")?;
    match store
        .get_config()
        .await
        .context("Failed to read agent configuration")?
    {
        Some(agent) => print_agent_configuration(&agent),
        None => println!("  {}", "(not configured)".dimmed()),
    }
    println!();

    Ok(())
}

async fn set(config_override: Option<PathBuf>, args: SetArgs) -> Result<()> {
    let config = SupervisorConfig::load_or_default(config_override).context("Failed to load configuration")?;
    let agent = args.to_configuration();
    agent.validate().context("Invalid agent configuration")?;

    if !agent.has_traffic_filter() {
        println!(
            "{}",
            "⚠ No --port or --container given; the agent will capture all host traffic".yellow()
        );
    }

    if args.apply {
        let engine = create_engine(&config)?;
        let state = engine
            .apply_configuration(agent)
            .await
            .context("Failed to apply agent configuration")?;
        engine.shutdown().await;
        if state.is_failed() {
            anyhow::bail!("Configuration saved but the agent did not start: {}", state);
        }
        println!("{}", format!("✓ Configuration saved, agent is {}", state).green());
    } else {
        let store = create_config_store(&config.config_store).context("Failed to initialize configuration store")?;
        store
            .put_config(agent)
            .await
            .context("Failed to save agent configuration")?;
        println!("{}", "✓ Configuration saved".green());
        println!("{}", "Run `agent-supervisor restart` to apply it.".dimmed());
    }

    Ok(())
}

async fn delete(config_override: Option<PathBuf>) -> Result<()> {
    let config = SupervisorConfig::load_or_default(config_override).context("Failed to load configuration")?;
    let store = create_config_store(&config.config_store).context("Failed to initialize configuration store")?;
    store
        .delete_config()
        .await
        .context("Failed to delete agent configuration")?;

    println!("{}", "✓ Agent configuration deleted".green());
    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = SupervisorConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    println!("{}", "✓ Configuration is valid".green());

    let store = create_config_store(&config.config_store).context("Failed to initialize configuration store")?;
    match store.get_config().await {
        Ok(Some(agent)) => {
            agent.validate().context("Stored agent configuration is invalid")?;
            println!("{}", "✓ Stored agent configuration is valid".green());
        }
        Ok(None) => println!("{}", "No agent configuration stored".dimmed()),
        Err(e) => println!("{}", format!("⚠ Could not read agent configuration: {}", e).yellow()),
    }

    Ok(())
}

async fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let sample = SupervisorConfig::default()
        .to_yaml_string()
        .context("Failed to render default configuration")?;
    std::fs::write(output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_args() -> SetArgs {
        SetArgs {
            api_key: "apk_0f3a".to_string(),
            api_secret: "s3cr3t".to_string(),
            project: "checkout".to_string(),
            port: None,
            container: None,
            disabled: false,
            apply: false,
        }
    }

    #[test]
    fn test_set_args_build_enabled_configuration() {
        let config = SetArgs {
            port: Some(8080),
            ..set_args()
        }
        .to_configuration();

        assert!(config.enabled);
        assert_eq!(config.target_port, Some(8080));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_set_args_port_zero_means_unset() {
        let config = SetArgs {
            port: Some(0),
            disabled: true,
            ..set_args()
        }
        .to_configuration();

        assert_eq!(config.target_port, None);
        assert!(!config.enabled);
    }

    #[tokio::test]
    async fn test_generate_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent-supervisor.yaml");

        generate(&path, false).await.unwrap();
        let loaded = SupervisorConfig::from_yaml_file(&path).unwrap();
        assert_eq!(loaded.reconciliation.poll_interval_ms, 2000);

        assert!(generate(&path, false).await.is_err());
        assert!(generate(&path, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_set_and_delete_against_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("agent.json");
        let config_path = dir.path().join("agent-supervisor.yaml");
        let config = SupervisorConfig {
            config_store: ConfigStoreSettings::File {
                path: store_path.clone(),
            },
            ..Default::default()
        };
        std::fs::write(&config_path, config.to_yaml_string().unwrap()).unwrap();

        set(Some(config_path.clone()), set_args()).await.unwrap();
        let stored = AgentConfiguration::from_json_slice(&std::fs::read(&store_path).unwrap()).unwrap();
        assert_eq!(stored.project_name, "checkout");

        delete(Some(config_path)).await.unwrap();
        assert!(!store_path.exists());
    }
}
