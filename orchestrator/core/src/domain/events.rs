// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;
use crate::domain::message::{MessageId, MessageType};
use crate::domain::task::{AssignmentFailure, Specialization, TaskId, TaskPriority};

/// Domain events emitted by the task manager, registry and message hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinationEvent {
    TaskCreated {
        task_id: TaskId,
        title: String,
        priority: TaskPriority,
        specialization: Specialization,
        created_at: DateTime<Utc>,
    },
    TaskAssigned {
        task_id: TaskId,
        agent_id: AgentId,
        title: String,
        score: f64,
        assigned_at: DateTime<Utc>,
    },
    AssignmentDeferred {
        task_id: TaskId,
        failure: AssignmentFailure,
        deferred_at: DateTime<Utc>,
    },
    TaskProgressed {
        task_id: TaskId,
        progress: u8,
        updated_at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: TaskId,
        agent_id: Option<AgentId>,
        on_time: bool,
        completed_at: DateTime<Utc>,
    },
    TaskFailed {
        task_id: TaskId,
        agent_id: Option<AgentId>,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    TaskCancelled {
        task_id: TaskId,
        cancelled_at: DateTime<Utc>,
    },
    TaskReassigned {
        task_id: TaskId,
        previous_agent: Option<AgentId>,
        reason: String,
        reassigned_at: DateTime<Utc>,
    },
    CoordinationTaskSpawned {
        task_id: TaskId,
        parent_task_id: TaskId,
        rule: String,
        agent_id: AgentId,
        title: String,
        spawned_at: DateTime<Utc>,
    },
    AgentRegistered {
        agent_id: AgentId,
        registered_at: DateTime<Utc>,
    },
    AgentStatusChanged {
        agent_id: AgentId,
        status: String,
        changed_at: DateTime<Utc>,
    },
    MessageSent {
        message_id: MessageId,
        sender: AgentId,
        receiver: AgentId,
        message_type: MessageType,
        sent_at: DateTime<Utc>,
    },
}

impl CoordinationEvent {
    /// The task this event concerns, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            CoordinationEvent::TaskCreated { task_id, .. }
            | CoordinationEvent::TaskAssigned { task_id, .. }
            | CoordinationEvent::AssignmentDeferred { task_id, .. }
            | CoordinationEvent::TaskProgressed { task_id, .. }
            | CoordinationEvent::TaskCompleted { task_id, .. }
            | CoordinationEvent::TaskFailed { task_id, .. }
            | CoordinationEvent::TaskCancelled { task_id, .. }
            | CoordinationEvent::TaskReassigned { task_id, .. }
            | CoordinationEvent::CoordinationTaskSpawned { task_id, .. } => Some(*task_id),
            CoordinationEvent::AgentRegistered { .. }
            | CoordinationEvent::AgentStatusChanged { .. }
            | CoordinationEvent::MessageSent { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CoordinationEvent::TaskCreated { .. } => "task_created",
            CoordinationEvent::TaskAssigned { .. } => "task_assigned",
            CoordinationEvent::AssignmentDeferred { .. } => "assignment_deferred",
            CoordinationEvent::TaskProgressed { .. } => "task_progressed",
            CoordinationEvent::TaskCompleted { .. } => "task_completed",
            CoordinationEvent::TaskFailed { .. } => "task_failed",
            CoordinationEvent::TaskCancelled { .. } => "task_cancelled",
            CoordinationEvent::TaskReassigned { .. } => "task_reassigned",
            CoordinationEvent::CoordinationTaskSpawned { .. } => "coordination_task_spawned",
            CoordinationEvent::AgentRegistered { .. } => "agent_registered",
            CoordinationEvent::AgentStatusChanged { .. } => "agent_status_changed",
            CoordinationEvent::MessageSent { .. } => "message_sent",
        }
    }
}
