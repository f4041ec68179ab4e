// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_hub;
pub mod registry;
pub mod scheduler;
pub mod task_manager;

pub use agent_hub::{AgentHub, HubError};
pub use registry::{AgentLiveness, AgentRegistry, RegistryEntry, RegistryError};
pub use scheduler::TaskScheduler;
pub use task_manager::{
    AssignOutcome, CompletionOutcome, SystemMetrics, SystemStatus, TaskFilter, TaskManager,
    TaskManagerConfig,
};
