// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the `xmrt` CLI

use anyhow::Result;
use colored::Colorize;

use xmrt_core::domain::message::MessageType;
use xmrt_core::domain::task::TaskId;

use crate::daemon::{check_daemon_running, DaemonClient, DaemonStatus};

pub mod agent;
pub mod config;
pub mod daemon;
pub mod message;
pub mod status;
pub mod task;

pub use self::agent::AgentCommand;
pub use self::config::ConfigCommand;
pub use self::daemon::DaemonCommand;
pub use self::message::MessageCommand;
pub use self::task::TaskCommand;

/// Client for the running daemon, or `None` after telling the user why not.
pub(crate) async fn connect(host: &str, port: u16) -> Result<Option<DaemonClient>> {
    match check_daemon_running(host, port).await {
        Ok(DaemonStatus::Running { .. }) => Ok(Some(DaemonClient::new(host, port)?)),
        Ok(DaemonStatus::Unhealthy { pid, error }) => {
            println!(
                "{}",
                format!("⚠ Daemon is running (PID: {}) but unhealthy: {}", pid, error).yellow()
            );
            println!("Run 'xmrt daemon status' for more info.");
            Ok(None)
        }
        Ok(DaemonStatus::Stopped) | Err(_) => {
            println!("{}", "This command requires the coordinator daemon.".red());
            println!("Run 'xmrt daemon start' to start it.");
            Ok(None)
        }
    }
}

pub(crate) fn parse_task_id(raw: &str) -> Result<TaskId, String> {
    TaskId::from_string(raw).map_err(|e| format!("invalid task id '{}': {}", raw, e))
}

pub(crate) fn parse_message_type(raw: &str) -> Result<MessageType, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_lowercase())).map_err(|_| {
        format!(
            "unknown message type '{}' (task_assignment, task_update, coordination, query, response, broadcast, alert)",
            raw
        )
    })
}

/// Parse a JSON argument, accepting `@path` to read it from a file.
pub(crate) fn parse_json_arg(raw: &str) -> Result<serde_json::Value> {
    use anyhow::Context;

    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read JSON file: {}", path))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("Argument is not valid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_message_type() {
        assert_eq!(parse_message_type("alert").unwrap(), MessageType::Alert);
        assert_eq!(
            parse_message_type("TASK_UPDATE").unwrap(),
            MessageType::TaskUpdate
        );
        assert!(parse_message_type("gossip").is_err());
    }

    #[test]
    fn test_parse_json_arg_inline_and_file() {
        assert_eq!(
            parse_json_arg(r#"{"apy": 4.2}"#).unwrap()["apy"],
            serde_json::json!(4.2)
        );

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tx": "0xabc"}}"#).unwrap();
        let arg = format!("@{}", file.path().display());
        assert_eq!(parse_json_arg(&arg).unwrap()["tx"], "0xabc");

        assert!(parse_json_arg("not json").is_err());
    }

    #[test]
    fn test_parse_task_id() {
        let id = TaskId::new();
        assert_eq!(parse_task_id(&id.to_string()).unwrap(), id);
        assert!(parse_task_id("42").is_err());
    }
}
