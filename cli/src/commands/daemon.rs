// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Daemon lifecycle management commands
//!
//! Commands: start, stop, status

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use tracing::{info, warn};

use xmrt_core::domain::node_config::CoordinatorConfig;

use crate::daemon::server::ListenOverrides;
use crate::daemon::{check_daemon_running, stop_daemon, DaemonStatus, DEFAULT_HOST, DEFAULT_PORT};

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon (if not already running)
    Start,

    /// Stop the daemon gracefully
    Stop {
        /// Force kill if daemon doesn't stop gracefully
        #[arg(short, long)]
        force: bool,

        /// Timeout in seconds (default: 30)
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },

    /// Check daemon status
    Status,
}

pub async fn handle_command(
    command: DaemonCommand,
    config_path: Option<PathBuf>,
    listen: ListenOverrides,
) -> Result<()> {
    let host = listen.host.as_deref().unwrap_or(DEFAULT_HOST);
    let port = listen.port.unwrap_or(DEFAULT_PORT);
    match command {
        DaemonCommand::Start => start(config_path, listen.clone()).await,
        DaemonCommand::Stop { force, timeout } => stop(host, port, force, timeout).await,
        DaemonCommand::Status => status(host, port).await,
    }
}

async fn start(config_path: Option<PathBuf>, listen: ListenOverrides) -> Result<()> {
    // Fail here rather than in the detached process
    let config = CoordinatorConfig::load_or_default(config_path.clone())
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    if config.spec.agents.is_empty() {
        println!("{}", "WARNING: No agents in the configured roster.".yellow().bold());
        println!("{}", "         Tasks will wait until agents register.".yellow());
    }

    // The daemon falls back to the configured port; probe where it will listen.
    let host = listen.host.as_deref().unwrap_or(DEFAULT_HOST);
    let port = listen.port.unwrap_or(config.spec.network.port);

    info!("Checking if daemon is already running...");

    match check_daemon_running(host, port).await {
        Ok(DaemonStatus::Running { pid, .. }) => {
            println!("{}", format!("✓ Daemon already running (PID: {})", pid).green());
            println!("Use 'xmrt daemon stop' to stop it first.");
            return Ok(());
        }
        Ok(DaemonStatus::Stopped) => {
            info!("Daemon not running, starting...");
        }
        Ok(DaemonStatus::Unhealthy { pid, error }) => {
            warn!("Daemon PID {} exists but unhealthy (error: {}), stopping...", pid, error);
            stop_daemon(false, 10).await?;
        }
        Err(e) => {
            warn!("Failed to check daemon status: {}", e);
        }
    }

    // Re-exec self with --daemon flag
    let current_exe =
        std::env::current_exe().context("Failed to get current executable path")?;

    let mut cmd = std::process::Command::new(current_exe);
    cmd.arg("--daemon");
    if let Some(host) = &listen.host {
        cmd.arg("--host").arg(host);
    }
    if let Some(port) = listen.port {
        cmd.arg("--port").arg(port.to_string());
    }

    if let Some(config) = config_path {
        cmd.arg("--config").arg(config);
    }

    // Detach from the terminal's process group
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let temp_dir = std::env::temp_dir();
    let stdout_path = temp_dir.join("xmrt.out");
    let stderr_path = temp_dir.join("xmrt.err");

    let stdout_file =
        std::fs::File::create(&stdout_path).context("Failed to create stdout log file")?;
    let stderr_file =
        std::fs::File::create(&stderr_path).context("Failed to create stderr log file")?;

    cmd.stdin(std::process::Stdio::null())
        .stdout(stdout_file)
        .stderr(stderr_file);

    println!("Redirecting logs to: {}", stdout_path.display());

    let child = cmd.spawn().context("Failed to spawn daemon process")?;

    println!(
        "{}",
        format!("✓ Daemon starting (PID: {})", child.id()).green()
    );
    println!("Check status with: xmrt daemon status");

    Ok(())
}

async fn stop(host: &str, port: u16, force: bool, timeout: u64) -> Result<()> {
    info!("Stopping daemon...");

    match check_daemon_running(host, port).await {
        Ok(DaemonStatus::Stopped) => {
            println!("{}", "ℹ Daemon not running".yellow());
            Ok(())
        }
        Ok(DaemonStatus::Running { pid, .. }) | Ok(DaemonStatus::Unhealthy { pid, .. }) => {
            println!("Stopping daemon (PID: {})...", pid);
            stop_daemon(force, timeout).await?;
            println!("{}", "✓ Daemon stopped".green());
            Ok(())
        }
        Err(e) => {
            println!("{}", format!("✗ Failed to check daemon: {}", e).red());
            Err(e)
        }
    }
}

async fn status(host: &str, port: u16) -> Result<()> {
    match check_daemon_running(host, port).await {
        Ok(DaemonStatus::Running { pid, uptime }) => {
            println!("{}", "✓ Daemon is running".green());
            if pid != 0 {
                println!("  PID: {}", pid);
            }
            if let Some(uptime) = uptime {
                println!("  Uptime: {}", format_duration(uptime));
            }
        }
        Ok(DaemonStatus::Stopped) => {
            println!("{}", "✗ Daemon is not running".red());
        }
        Ok(DaemonStatus::Unhealthy { pid, error }) => {
            println!(
                "{}",
                format!("⚠ Daemon unhealthy (PID: {})", pid).yellow()
            );
            println!("  Process exists but HTTP API check failed: {}", error);
            let temp_dir = std::env::temp_dir();
            println!(
                "  Check logs at {} and {}",
                temp_dir.join("xmrt.out").display(),
                temp_dir.join("xmrt.err").display()
            );
        }
        Err(e) => {
            println!("{}", format!("✗ Failed to check status: {}", e).red());
            return Err(e);
        }
    }

    Ok(())
}

pub(crate) fn format_duration(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(59), "0m");
        assert_eq!(format_duration(3_660), "1h 1m");
        assert_eq!(format_duration(90_061), "1d 1h 1m");
    }
}
