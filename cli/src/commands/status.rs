// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `xmrt status`: one-screen summary of the coordinator.

use anyhow::Result;
use colored::Colorize;

use xmrt_core::presentation::api::SystemStatusResponse;

use super::connect;
use super::daemon::format_duration;

pub async fn handle_command(host: &str, port: u16) -> Result<()> {
    let Some(client) = connect(host, port).await? else {
        return Ok(());
    };
    let status = client.system_status().await?;
    print_status(&status);
    Ok(())
}

fn print_status(response: &SystemStatusResponse) {
    let status = &response.status;
    let metrics = &status.metrics;

    println!("{}", "XMRT coordinator".bold());
    println!("  Uptime: {}", format_duration(response.uptime_seconds));
    let queue = if response.queue.healthy {
        "healthy".green()
    } else {
        "degraded".red()
    };
    println!("  Message queue: {:?} ({})", response.queue.backend, queue);
    if let Some(detail) = &response.queue.detail {
        println!("    {}", detail.dimmed());
    }
    println!();

    println!("{}", "Tasks:".bold());
    println!(
        "  {} total, {} pending, {} assigned, {} in progress",
        metrics.total_tasks, metrics.pending_tasks, metrics.assigned_tasks, metrics.in_progress_tasks
    );
    println!(
        "  {} completed, {} failed, {} cancelled ({:.1}% completion)",
        metrics.completed_tasks,
        metrics.failed_tasks,
        metrics.cancelled_tasks,
        metrics.completion_rate * 100.0
    );
    if let Some(minutes) = metrics.average_completion_minutes {
        println!("  Average completion: {:.1} min", minutes);
    }
    let queues: Vec<String> = status
        .queue_lengths
        .iter()
        .map(|(tier, len)| format!("{}={}", tier, len))
        .collect();
    println!("  Queued: {}", queues.join(" "));
    println!();

    println!(
        "{} ({} registered, {:.0}% utilized, mean score {:.3})",
        "Agents:".bold(),
        metrics.registered_agents,
        metrics.agent_utilization * 100.0,
        metrics.average_performance_score
    );
    for agent in &status.agents {
        let availability = if agent.availability {
            "●".green()
        } else {
            "○".red()
        };
        println!(
            "  {} {:<20} {:<12} {}/{}  score {:.3}",
            availability,
            agent.id.to_string(),
            agent.specialization.as_str(),
            agent.active_tasks,
            agent.max_concurrent_tasks,
            agent.performance_score
        );
    }
    println!();

    println!("{} {}", "Coordination rules:".bold(), status.rules.join(", "));
}
