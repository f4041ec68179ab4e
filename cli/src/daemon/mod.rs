// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - PID file management
//! - HTTP health checks
//! - Graceful shutdown

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
#[cfg(unix)]
use tokio::time::sleep;
use tracing::info;
#[cfg(unix)]
use tracing::warn;

pub mod client;
pub mod server;

pub use client::DaemonClient;
pub use server::start_daemon;

#[cfg(unix)]
const PID_FILE: &str = "/var/run/xmrt/xmrt.pid";
#[cfg(unix)]
const PID_FILE_FALLBACK: &str = "/tmp/xmrt.pid";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone)]
pub enum DaemonStatus {
    Running { pid: u32, uptime: Option<u64> },
    Stopped,
    Unhealthy { pid: u32, error: String },
}

/// `http://host:port`, keeping an explicit scheme if the host carries one.
pub fn base_url(host: &str, port: u16) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host.trim_end_matches('/'), port)
    } else {
        format!("http://{}:{}", host, port)
    }
}

/// Check if daemon is running via HTTP health check (primary) or PID file (secondary)
pub async fn check_daemon_running(host: &str, port: u16) -> Result<DaemonStatus> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(500))
        .build()?;

    let health_url = format!("{}/health", base_url(host, port));

    // The PID is only known when the daemon runs on this machine.
    let pid_file = get_pid_file_path();
    let local_pid = match std::fs::read_to_string(&pid_file) {
        Ok(content) => content.trim().parse::<u32>().ok(),
        Err(_) => None,
    };

    match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let uptime = resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v["uptime_seconds"].as_u64());

            Ok(DaemonStatus::Running {
                pid: local_pid.unwrap_or(0),
                uptime,
            })
        }
        Ok(resp) => Ok(DaemonStatus::Unhealthy {
            pid: local_pid.unwrap_or(0),
            error: format!("HTTP {}", resp.status()),
        }),
        Err(e) => match local_pid {
            Some(pid) if process_exists(pid) => Ok(DaemonStatus::Unhealthy {
                pid,
                error: e.to_string(),
            }),
            Some(_) => {
                // Stale PID file
                let _ = std::fs::remove_file(&pid_file);
                Ok(DaemonStatus::Stopped)
            }
            None => Ok(DaemonStatus::Stopped),
        },
    }
}

/// Stop the daemon gracefully
pub async fn stop_daemon(force: bool, timeout_secs: u64) -> Result<()> {
    let pid_file = get_pid_file_path();

    let pid = std::fs::read_to_string(&pid_file)
        .context("Failed to read PID file")?
        .trim()
        .parse::<u32>()
        .context("Invalid PID")?;

    info!("Sending SIGTERM to process {}", pid);

    #[cfg(unix)]
    {
        send_signal(pid, libc::SIGTERM)?;

        for _ in 0..timeout_secs {
            if !process_exists(pid) {
                info!("Daemon stopped gracefully");
                let _ = std::fs::remove_file(&pid_file);
                return Ok(());
            }
            sleep(Duration::from_secs(1)).await;
        }

        if force {
            warn!("Graceful shutdown timeout, sending SIGKILL");
            send_signal(pid, libc::SIGKILL)?;
            sleep(Duration::from_secs(1)).await;
        } else {
            anyhow::bail!("Daemon did not stop within timeout");
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (force, timeout_secs);
        anyhow::bail!("Stopping the daemon is only supported on Unix (PID {})", pid);
    }

    #[cfg(unix)]
    {
        let _ = std::fs::remove_file(&pid_file);
        Ok(())
    }
}

pub fn get_pid_file_path() -> PathBuf {
    #[cfg(unix)]
    {
        let uid = unsafe { libc::geteuid() };
        if uid == 0 {
            PathBuf::from(PID_FILE)
        } else {
            PathBuf::from(PID_FILE_FALLBACK)
        }
    }

    #[cfg(not(unix))]
    {
        std::env::temp_dir().join("xmrt.pid")
    }
}

fn process_exists(pid: u32) -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) -> Result<()> {
    unsafe {
        if libc::kill(pid as i32, signal) != 0 {
            anyhow::bail!("Failed to send signal {} to process {}", signal, pid);
        }
    }
    Ok(())
}

/// Write PID file
pub fn write_pid_file(pid: u32) -> Result<()> {
    let pid_file = get_pid_file_path();
    if let Some(parent) = pid_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create PID directory: {:?}", parent))?;
    }
    std::fs::write(&pid_file, pid.to_string())
        .with_context(|| format!("Failed to write PID file: {:?}", pid_file))?;
    info!("Wrote PID file: {:?}", pid_file);
    Ok(())
}

/// Remove PID file
pub fn remove_pid_file() -> Result<()> {
    let pid_file = get_pid_file_path();
    if pid_file.exists() {
        std::fs::remove_file(&pid_file)
            .with_context(|| format!("Failed to remove PID file: {:?}", pid_file))?;
        info!("Removed PID file: {:?}", pid_file);
    }
    Ok(())
}
