// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use xmrt_core::domain::node_config::{CoordinatorConfig, QueueBackend, CONFIG_PATH_ENV};

const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./xmrt-config.yaml)
        #[arg(short, long, default_value = "./xmrt-config.yaml")]
        output: PathBuf,

        /// Include the default roster and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, examples } => generate(&output, examples),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = CoordinatorConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./xmrt-config.yaml");
        println!("  4. ~/.xmrt/config.yaml");
        println!("  5. /etc/xmrt/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Coordinator:".bold());
    println!("  Name: {}", config.metadata.name);
    if let Some(version) = &config.metadata.version {
        println!("  Version: {}", version);
    }
    println!(
        "  Listen: {}:{}",
        config.spec.network.bind_address, config.spec.network.port
    );
    println!();

    let scheduler = &config.spec.scheduler;
    println!("{}", "Scheduler:".bold());
    println!("  Poll interval: {}s", scheduler.poll_interval_seconds);
    println!("  Staleness threshold: {}s", scheduler.staleness_threshold_seconds);
    println!(
        "  Assignments per tier per pass: {}",
        scheduler.assignments_per_tier_per_tick
    );
    println!();

    let queue = &config.spec.message_queue;
    println!("{}", "Message queue:".bold());
    match queue.backend {
        QueueBackend::Local => println!("  Backend: local (in-process)"),
        QueueBackend::Redis => {
            println!("  Backend: redis");
            println!(
                "  URL: {}",
                queue.redis_url.as_deref().unwrap_or("(missing)")
            );
            println!("  Key prefix: {}", queue.key_prefix);
        }
    }
    println!();

    println!("{}", "Agents:".bold());
    for agent in &config.spec.agents {
        println!(
            "  {} ({}) [{}]",
            agent.id.bold(),
            agent.specialization,
            agent.capabilities.join(", ")
        );
    }
    println!();

    if let Some(port) = config.spec.observability.metrics_port {
        println!("{}", "Observability:".bold());
        println!("  Prometheus: 0.0.0.0:{}", port);
        println!();
    }

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = CoordinatorConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: &Path, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid() {
        for template in [MINIMAL_TEMPLATE, EXAMPLES_TEMPLATE] {
            let config = CoordinatorConfig::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_examples_template_lists_default_roster() {
        let config = CoordinatorConfig::from_yaml_str(EXAMPLES_TEMPLATE).unwrap();
        let ids: Vec<&str> = config.spec.agents.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["governor", "defi_specialist", "security_guardian", "community_manager"]
        );
        assert_eq!(config.spec.scheduler.staleness_threshold_seconds, 3600);
    }

    #[test]
    fn test_generate_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xmrt-config.yaml");
        generate(&path, false).unwrap();

        let config = CoordinatorConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.metadata.name, "xmrt-coordinator");
        assert_eq!(config.spec.agents.len(), 4);
    }
}
