// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Task commands
//!
//! Commands: create, bulk, get, list, progress, complete, fail, cancel,
//! reassign, watch

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use xmrt_core::application::task_manager::CompletionOutcome;
use xmrt_core::domain::agent::Capability;
use xmrt_core::domain::task::{NewTask, Specialization, Task, TaskId, TaskPriority, TaskStatus};

use super::{connect, parse_json_arg, parse_task_id};
use crate::daemon::client::TaskListFilter;
use crate::daemon::DaemonClient;

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Create a task
    Create {
        /// Short task title
        #[arg(value_name = "TITLE")]
        title: String,

        /// Specialization that must handle the task
        #[arg(short, long)]
        specialization: Specialization,

        /// critical, high, medium or low
        #[arg(short, long, default_value = "medium")]
        priority: TaskPriority,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Deadline (RFC 3339, e.g. 2026-11-01T12:00:00Z)
        #[arg(long)]
        deadline: Option<DateTime<Utc>>,

        /// Task that must complete first (repeatable)
        #[arg(long = "depends-on", value_parser = parse_task_id)]
        depends_on: Vec<TaskId>,

        /// Capability that improves an agent's match (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,

        /// Estimated duration in minutes
        #[arg(long)]
        estimate: Option<u32>,
    },

    /// Create tasks from a YAML or JSON list
    Bulk {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Show one task
    Get {
        #[arg(value_name = "TASK_ID", value_parser = parse_task_id)]
        task_id: TaskId,
    },

    /// List tasks, oldest first
    List {
        #[arg(long)]
        status: Option<TaskStatus>,

        #[arg(long)]
        specialization: Option<Specialization>,

        #[arg(long)]
        priority: Option<TaskPriority>,

        /// Only tasks held by this agent
        #[arg(long)]
        agent: Option<String>,
    },

    /// Report progress (0-100, 100 completes the task)
    Progress {
        #[arg(value_name = "TASK_ID", value_parser = parse_task_id)]
        task_id: TaskId,

        #[arg(value_name = "PERCENT", allow_hyphen_values = true)]
        progress: i64,

        /// Partial result (JSON string or @file.json)
        #[arg(short, long)]
        result: Option<String>,
    },

    /// Mark a task completed
    Complete {
        #[arg(value_name = "TASK_ID", value_parser = parse_task_id)]
        task_id: TaskId,

        /// Result payload (JSON string or @file.json)
        #[arg(short, long)]
        result: Option<String>,
    },

    /// Mark a task failed
    Fail {
        #[arg(value_name = "TASK_ID", value_parser = parse_task_id)]
        task_id: TaskId,

        #[arg(short, long)]
        reason: String,
    },

    /// Cancel a task that has not finished
    Cancel {
        #[arg(value_name = "TASK_ID", value_parser = parse_task_id)]
        task_id: TaskId,
    },

    /// Detach a task from its agent and queue it again
    Reassign {
        #[arg(value_name = "TASK_ID", value_parser = parse_task_id)]
        task_id: TaskId,

        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Follow coordination events, optionally for a single task
    Watch {
        #[arg(value_name = "TASK_ID", value_parser = parse_task_id)]
        task_id: Option<TaskId>,
    },
}

pub async fn handle_command(command: TaskCommand, host: &str, port: u16) -> Result<()> {
    let Some(client) = connect(host, port).await? else {
        return Ok(());
    };

    match command {
        TaskCommand::Create {
            title,
            specialization,
            priority,
            description,
            deadline,
            depends_on,
            capabilities,
            estimate,
        } => {
            let mut request = NewTask::new(title, specialization)
                .with_priority(priority)
                .with_description(description);
            if let Some(deadline) = deadline {
                request = request.with_deadline(deadline);
            }
            for dependency in depends_on {
                request = request.depends_on(dependency);
            }
            for raw in capabilities {
                let capability = Capability::parse(&raw)
                    .with_context(|| format!("Invalid capability '{}'", raw))?;
                request = request.requiring(capability);
            }
            request.estimated_duration_minutes = estimate;
            create(&client, request).await
        }
        TaskCommand::Bulk { file } => bulk(&client, file).await,
        TaskCommand::Get { task_id } => {
            let task = client.get_task(task_id).await?;
            print_task_details(&task);
            Ok(())
        }
        TaskCommand::List {
            status,
            specialization,
            priority,
            agent,
        } => {
            let filter = TaskListFilter {
                status: status.map(|s| s.as_str().to_string()),
                specialization: specialization.map(|s| s.as_str().to_string()),
                priority: priority.map(|p| p.as_str().to_string()),
                agent,
            };
            list(&client, &filter).await
        }
        TaskCommand::Progress {
            task_id,
            progress,
            result,
        } => {
            let result = result.as_deref().map(parse_json_arg).transpose()?;
            let task = client.update_progress(task_id, progress, result).await?;
            println!(
                "{}",
                format!("✓ Task {} at {}% ({})", task.id, task.progress, task.status).green()
            );
            Ok(())
        }
        TaskCommand::Complete { task_id, result } => {
            let result = result.as_deref().map(parse_json_arg).transpose()?;
            let outcome = client.complete_task(task_id, result).await?;
            print_completion(&outcome);
            Ok(())
        }
        TaskCommand::Fail { task_id, reason } => {
            let task = client.fail_task(task_id, &reason).await?;
            println!("{}", format!("✓ Task {} marked failed", task.id).yellow());
            Ok(())
        }
        TaskCommand::Cancel { task_id } => {
            let task = client.cancel_task(task_id).await?;
            println!("{}", format!("✓ Task {} cancelled", task.id).green());
            Ok(())
        }
        TaskCommand::Reassign { task_id, reason } => {
            let task = client.reassign_task(task_id, reason.as_deref()).await?;
            println!(
                "{}",
                format!("✓ Task {} returned to the {} queue", task.id, task.priority).green()
            );
            Ok(())
        }
        TaskCommand::Watch { task_id } => {
            println!("{}", "Streaming coordination events (Ctrl+C to stop)...".dimmed());
            client.stream_events(task_id).await
        }
    }
}

async fn create(client: &DaemonClient, request: NewTask) -> Result<()> {
    let task = client.create_task(&request).await?;
    println!("{}", format!("✓ Task created: {}", task.id).green());
    match &task.assigned_agent {
        Some(agent) => println!("  Assigned to: {}", agent.to_string().bold()),
        None => println!("  Status: {}", task.status.to_string().yellow()),
    }
    Ok(())
}

/// Read a list of tasks from YAML (JSON is valid YAML).
fn read_task_file(file: &Path) -> Result<Vec<NewTask>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read task file: {:?}", file))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse task file: {:?}", file))
}

async fn bulk(client: &DaemonClient, file: PathBuf) -> Result<()> {
    let tasks = read_task_file(&file)?;
    let results = client.create_tasks(&tasks).await?;

    let mut created = 0;
    for (request, item) in tasks.iter().zip(&results) {
        match (&item.task_id, &item.error) {
            (Some(id), _) => {
                created += 1;
                println!("  {} {} {}", "✓".green(), id, request.title);
            }
            (None, error) => println!(
                "  {} {} {}",
                "✗".red(),
                request.title,
                error.as_deref().unwrap_or("rejected").red()
            ),
        }
    }
    println!("Created {} of {} tasks", created, tasks.len());
    Ok(())
}

async fn list(client: &DaemonClient, filter: &TaskListFilter) -> Result<()> {
    let tasks = client.list_tasks(filter).await?;
    if tasks.is_empty() {
        println!("{}", "No tasks found".dimmed());
        return Ok(());
    }

    println!(
        "{:<36}  {:<9}  {:<12}  {:<11}  {:>4}  {:<18}  {}",
        "ID".bold(),
        "PRIORITY".bold(),
        "SPECIALTY".bold(),
        "STATUS".bold(),
        "%".bold(),
        "AGENT".bold(),
        "TITLE".bold()
    );
    for task in &tasks {
        println!(
            "{:<36}  {:<9}  {:<12}  {:<11}  {:>4}  {:<18}  {}",
            task.id,
            task.priority.as_str(),
            task.specialization.as_str(),
            colored_status(task.status),
            task.progress,
            task.assigned_agent
                .as_ref()
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string()),
            task.title
        );
    }
    Ok(())
}

fn colored_status(status: TaskStatus) -> colored::ColoredString {
    let text = status.as_str();
    match status {
        TaskStatus::Pending => text.yellow(),
        TaskStatus::Assigned | TaskStatus::InProgress => text.cyan(),
        TaskStatus::Completed => text.green(),
        TaskStatus::Failed => text.red(),
        TaskStatus::Cancelled => text.dimmed(),
    }
}

fn print_task_details(task: &Task) {
    println!("{}", task.title.bold());
    println!("  ID: {}", task.id);
    println!("  Status: {} ({}%)", colored_status(task.status), task.progress);
    println!("  Priority: {}", task.priority);
    println!("  Specialization: {}", task.specialization);
    if let Some(agent) = &task.assigned_agent {
        println!("  Agent: {}", agent);
    }
    if let Some(parent) = task.coordination_of {
        println!("  Coordinates: {}", parent);
    }
    if !task.dependencies.is_empty() {
        let deps: Vec<String> = task.dependencies.iter().map(|d| d.to_string()).collect();
        println!("  Depends on: {}", deps.join(", "));
    }
    if let Some(deadline) = task.deadline {
        println!("  Deadline: {}", deadline.to_rfc3339());
    }
    if let Some(reason) = &task.last_assignment_failure {
        println!("  Waiting: {}", reason.to_string().yellow());
    }
    if !task.description.is_empty() {
        println!("  Description: {}", task.description);
    }
    if let Some(result) = &task.result {
        println!(
            "  Result: {}",
            serde_json::to_string_pretty(result).unwrap_or_default()
        );
    }
}

fn print_completion(outcome: &CompletionOutcome) {
    match outcome {
        CompletionOutcome::Completed {
            task_id,
            on_time,
            unblocked,
            ..
        } => {
            let timing = if *on_time { "on time" } else { "late" };
            println!("{}", format!("✓ Task {} completed ({})", task_id, timing).green());
            for next in unblocked {
                println!("  Unblocked {} → {}", next.task_id, next.agent_id);
            }
        }
        CompletionOutcome::AlreadyCompleted { task_id } => {
            println!("{}", format!("ℹ Task {} was already completed", task_id).yellow());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_task_file_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
- title: Review staking contract
  specialization: security
  priority: high
- title: Announce upgrade
  specialization: community
"#
        )
        .unwrap();

        let tasks = read_task_file(file.path()).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].priority, TaskPriority::High);
        assert_eq!(tasks[1].priority, TaskPriority::Medium);
        assert_eq!(tasks[1].specialization, Specialization::Community);
    }

    #[test]
    fn test_read_task_file_rejects_unknown_specialization() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "- title: Mine blocks\n  specialization: mining").unwrap();
        assert!(read_task_file(file.path()).is_err());
    }
}
