// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # XMRT Coordinator CLI
//!
//! The `xmrt` binary runs the coordination daemon and talks to it over HTTP.
//!
//! - **Daemon mode**: `xmrt --daemon` serves the coordination API in the foreground
//! - **Client mode**: every other command calls the running daemon
//! - **Detection**: PID file + HTTP health check
//!
//! ## Commands
//!
//! - `xmrt daemon start|stop|status` - Manage daemon lifecycle
//! - `xmrt task create|bulk|get|list|progress|complete|fail|cancel|reassign|watch`
//! - `xmrt agent list|show|register|heartbeat|find`
//! - `xmrt message send|broadcast|inbox|history`
//! - `xmrt status` - System summary
//! - `xmrt config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;
use xmrt_core::domain::node_config::CoordinatorConfig;

mod commands;
mod daemon;

use commands::{AgentCommand, ConfigCommand, DaemonCommand, MessageCommand, TaskCommand};
use daemon::server::ListenOverrides;
use daemon::{DEFAULT_HOST, DEFAULT_PORT};

/// XMRT Coordinator - task and agent coordination for the XMRT DAO
#[derive(Parser)]
#[command(name = "xmrt")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Run as background daemon service
    #[arg(long, global = true)]
    daemon: bool,

    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "XMRT_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// HTTP API port (default: 8000, or spec.network.port in daemon mode)
    #[arg(long, global = true, env = "XMRT_PORT")]
    port: Option<u16>,

    /// HTTP API host (default: 127.0.0.1, or spec.network.bind_address in daemon mode)
    #[arg(long, global = true, env = "XMRT_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error). Defaults to
    /// spec.observability.log_level from the config, then info
    #[arg(long, global = true, env = "XMRT_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage daemon lifecycle
    #[command(name = "daemon")]
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Task operations
    #[command(name = "task")]
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// Agent management
    #[command(name = "agent")]
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Inter-agent messaging
    #[command(name = "message")]
    Message {
        #[command(subcommand)]
        command: MessageCommand,
    },

    /// Coordinator summary: queues, agents and metrics
    #[command(name = "status")]
    Status,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    let config = CoordinatorConfig::load_or_default(cli.config.clone()).ok();
    init_logging(&resolve_log_level(cli.log_level.take(), config.as_ref()))?;

    let listen = ListenOverrides {
        host: cli.host,
        port: cli.port,
    };

    if cli.daemon {
        info!("Starting XMRT coordinator in daemon mode");
        return daemon::start_daemon(cli.config, listen).await;
    }

    let host = listen.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = listen.port.unwrap_or(DEFAULT_PORT);

    match cli.command {
        Some(Commands::Daemon { command }) => {
            commands::daemon::handle_command(command, cli.config, listen).await
        }
        Some(Commands::Task { command }) => {
            commands::task::handle_command(command, &host, port).await
        }
        Some(Commands::Agent { command }) => {
            commands::agent::handle_command(command, &host, port).await
        }
        Some(Commands::Message { command }) => {
            commands::message::handle_command(command, &host, port).await
        }
        Some(Commands::Status) => commands::status::handle_command(&host, port).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// The flag (or `XMRT_LOG_LEVEL`) wins over the config file. A config that
/// fails to load here is reported later by the command that needs it.
fn resolve_log_level(flag: Option<String>, config: Option<&CoordinatorConfig>) -> String {
    flag.or_else(|| config.map(|c| c.spec.observability.log_level.clone()))
        .unwrap_or_else(|| "info".to_string())
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_level(level: &str) -> CoordinatorConfig {
        let mut config = CoordinatorConfig::default();
        config.spec.observability.log_level = level.to_string();
        config
    }

    #[test]
    fn test_config_log_level_used_without_flag() {
        let config = config_with_level("debug");
        assert_eq!(resolve_log_level(None, Some(&config)), "debug");
    }

    #[test]
    fn test_log_level_flag_overrides_config() {
        let config = config_with_level("debug");
        assert_eq!(
            resolve_log_level(Some("warn".to_string()), Some(&config)),
            "warn"
        );
    }

    #[test]
    fn test_log_level_defaults_to_info() {
        assert_eq!(resolve_log_level(None, None), "info");
    }

    #[test]
    fn test_log_level_flag_is_optional() {
        let cli = Cli::try_parse_from(["xmrt", "status"]).unwrap();
        if std::env::var("XMRT_LOG_LEVEL").is_err() {
            assert!(cli.log_level.is_none());
        }
        let cli = Cli::try_parse_from(["xmrt", "--log-level", "trace", "status"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("trace"));
    }
}
