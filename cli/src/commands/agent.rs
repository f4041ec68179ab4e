// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use xmrt_core::application::registry::AgentLiveness;
use xmrt_core::domain::task::Specialization;

use super::connect;
use crate::daemon::client::{AgentDetails, AgentRegistration};

#[derive(Subcommand)]
pub enum AgentCommand {
    /// List registered agents with their load
    List,

    /// Show an agent's scheduling and registry state
    Show {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,
    },

    /// Register (or refresh) an agent
    Register {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,

        /// Display name (default: the id)
        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        specialization: Specialization,

        /// Capability tag (repeatable)
        #[arg(short, long = "capability")]
        capabilities: Vec<String>,

        /// Concurrent task limit
        #[arg(long)]
        max_tasks: Option<usize>,

        /// Informational endpoint URL
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Report liveness (active, busy or offline)
    Heartbeat {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,

        #[arg(short, long, default_value = "active")]
        status: AgentLiveness,
    },

    /// Active agents declaring a capability
    Find {
        #[arg(value_name = "CAPABILITY")]
        capability: String,
    },
}

pub async fn handle_command(command: AgentCommand, host: &str, port: u16) -> Result<()> {
    let Some(client) = connect(host, port).await? else {
        return Ok(());
    };

    match command {
        AgentCommand::List => {
            let agents = client.list_agents().await?;
            if agents.is_empty() {
                println!("{}", "No agents registered".dimmed());
                return Ok(());
            }

            println!(
                "{:<20}  {:<12}  {:<7}  {:<6}  {:<9}  {}",
                "ID".bold(),
                "SPECIALTY".bold(),
                "LOAD".bold(),
                "SCORE".bold(),
                "AVAILABLE".bold(),
                "NAME".bold()
            );
            for agent in agents {
                println!(
                    "{:<20}  {:<12}  {:<7}  {:<6.3}  {:<9}  {}",
                    agent.id.to_string(),
                    agent.specialization.as_str(),
                    format!("{}/{}", agent.current_tasks.len(), agent.max_concurrent_tasks),
                    agent.performance_score,
                    if agent.availability { "yes" } else { "no" },
                    agent.name
                );
            }
        }
        AgentCommand::Show { agent_id } => {
            let details = client.get_agent(&agent_id).await?;
            print_agent(&details);
        }
        AgentCommand::Register {
            agent_id,
            name,
            specialization,
            capabilities,
            max_tasks,
            endpoint,
        } => {
            let registration = AgentRegistration {
                name: name.unwrap_or_else(|| agent_id.clone()),
                id: agent_id,
                specialization,
                capabilities,
                max_concurrent_tasks: max_tasks,
                endpoint,
            };
            let entry = client.register_agent(&registration).await?;
            println!("{}", format!("✓ Agent registered: {}", entry.id).green());
            if !entry.capabilities.is_empty() {
                let tags: Vec<&str> = entry.capabilities.iter().map(|c| c.as_str()).collect();
                println!("  Capabilities: {}", tags.join(", "));
            }
        }
        AgentCommand::Heartbeat { agent_id, status } => {
            client.heartbeat(&agent_id, status).await?;
            println!(
                "{}",
                format!("✓ Heartbeat recorded for {} ({})", agent_id, status.as_str()).green()
            );
        }
        AgentCommand::Find { capability } => {
            let entries = client.agents_by_capability(&capability).await?;
            if entries.is_empty() {
                println!("{}", format!("No active agent offers '{}'", capability).dimmed());
            }
            for entry in entries {
                println!("  {} ({})", entry.id.to_string().bold(), entry.name);
            }
        }
    }

    Ok(())
}

fn print_agent(details: &AgentDetails) {
    let agent = &details.scheduling.agent;
    println!("{} ({})", agent.name.bold(), agent.id);
    println!("  Specialization: {}", agent.specialization);
    println!(
        "  Load: {}/{} ({:.0}%)",
        agent.current_tasks.len(),
        agent.max_concurrent_tasks,
        details.scheduling.load_ratio * 100.0
    );
    println!("  Performance score: {:.3}", agent.performance_score);
    println!(
        "  Available: {}",
        if agent.availability { "yes".green() } else { "no".red() }
    );
    println!("  Last active: {}", agent.last_active.to_rfc3339());

    if let Some(entry) = &details.registry {
        println!("  Registry status: {}", entry.status.as_str());
        if let Some(endpoint) = &entry.endpoint {
            println!("  Endpoint: {}", endpoint);
        }
    }

    if !details.scheduling.tasks.is_empty() {
        println!("  Tasks:");
        for task in &details.scheduling.tasks {
            println!("    {} [{}] {}", task.id, task.status, task.title);
        }
    }
}
