// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Daemon HTTP server implementation

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use xmrt_core::{
    application::{
        agent_hub::AgentHub,
        registry::AgentRegistry,
        scheduler::TaskScheduler,
        task_manager::{TaskManager, TaskManagerConfig},
    },
    domain::{
        clock::{Clock, SystemClock},
        coordination::RuleSet,
        node_config::CoordinatorConfig,
    },
    infrastructure::{connect_message_queue, EventBus},
    presentation::api::{app, AppState},
};

use super::{remove_pid_file, write_pid_file};

/// Where the daemon listens. Flags and environment win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ListenOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

pub async fn start_daemon(config_path: Option<PathBuf>, listen: ListenOverrides) -> Result<()> {
    let pid = std::process::id();
    write_pid_file(pid)?;

    // Ensure PID file cleanup on exit
    let _guard = PidFileGuard;

    info!("XMRT coordinator starting (PID: {})", pid);

    let config = CoordinatorConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    info!(
        "Configuration loaded: name={}, queue={:?}, agents={}",
        config.metadata.name,
        config.spec.message_queue.backend,
        config.spec.agents.len()
    );

    if let Some(metrics_port) = config.spec.observability.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], metrics_port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Prometheus metrics exposed on {}", addr);
    }

    // Core services
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let event_bus = EventBus::with_default_capacity();
    let vocabulary = config.vocabulary()?;

    let manager = Arc::new(TaskManager::new(
        TaskManagerConfig::from(&config.spec.scheduler),
        RuleSet::standard(),
        event_bus.clone(),
        clock.clone(),
    ));
    let registry = Arc::new(AgentRegistry::new(vocabulary, event_bus.clone(), clock.clone()));

    let queue = connect_message_queue(&config.spec.message_queue)
        .await
        .context("Failed to connect message queue")?;
    let hub = Arc::new(AgentHub::new(
        queue,
        registry.clone(),
        event_bus.clone(),
        &config.spec.message_queue,
    ));

    seed_roster(&config, &manager, &registry, clock.as_ref())?;

    // Background workers
    let token = CancellationToken::new();
    let scheduler = TaskScheduler::spawn(
        manager.clone(),
        Duration::from_secs(config.spec.scheduler.poll_interval_seconds),
        token.clone(),
    );
    let dispatcher = hub.clone().spawn_assignment_dispatcher(&event_bus, token.clone());

    let router = app(AppState {
        manager,
        hub,
        registry,
        event_bus,
        started_at: Instant::now(),
    });

    let host = listen
        .host
        .unwrap_or_else(|| config.spec.network.bind_address.clone());
    let port = listen.port.unwrap_or(config.spec.network.port);
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Coordinator listening on {}", addr);

    let shutdown = token.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("HTTP server failed")?;

    token.cancel();
    for (name, handle) in [("scheduler", scheduler), ("dispatcher", dispatcher)] {
        if let Err(e) = handle.await {
            warn!("{} task ended abnormally: {}", name, e);
        }
    }

    info!("Coordinator shutting down");

    Ok(())
}

/// Register the configured agents with both the registry and the scheduler.
fn seed_roster(
    config: &CoordinatorConfig,
    manager: &TaskManager,
    registry: &AgentRegistry,
    clock: &dyn Clock,
) -> Result<()> {
    for (entry, agent) in config
        .spec
        .agents
        .iter()
        .zip(config.roster_agents(clock.now())?)
    {
        registry
            .register_agent(
                agent.id.clone(),
                agent.name.clone(),
                &entry.capabilities,
                entry.endpoint.clone(),
            )
            .with_context(|| format!("Failed to register agent '{}'", entry.id))?;
        manager
            .register_agent(agent)
            .with_context(|| format!("Failed to schedule agent '{}'", entry.id))?;
    }
    info!("Seeded {} agents from configuration", config.spec.agents.len());
    Ok(())
}

struct PidFileGuard;

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        let _ = remove_pid_file();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmrt_core::domain::agent::AgentId;
    use xmrt_core::domain::clock::ManualClock;

    #[test]
    fn test_seed_roster_registers_default_personas() {
        let config = CoordinatorConfig::default();
        let clock = ManualClock::default();
        let bus = EventBus::new(64);
        let manager = TaskManager::new(
            TaskManagerConfig::default(),
            RuleSet::standard(),
            bus.clone(),
            Arc::new(ManualClock::default()),
        );
        let registry = AgentRegistry::new(
            config.vocabulary().unwrap(),
            bus,
            Arc::new(ManualClock::default()),
        );

        seed_roster(&config, &manager, &registry, &clock).unwrap();

        assert_eq!(manager.list_agents().len(), 4);
        assert_eq!(registry.list_agents().len(), 4);
        let guardian = registry.get_agent(&AgentId::new("security_guardian")).unwrap();
        assert_eq!(guardian.capabilities.len(), 4);
        assert!(manager.get_agent(&AgentId::new("governor")).is_ok());
    }
}
