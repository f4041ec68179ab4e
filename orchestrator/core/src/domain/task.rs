// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Task Aggregate
//!
//! A [`Task`] is a unit of work routed to exactly one agent by specialization.
//!
//! ## Lifecycle
//!
//! ```text
//! Pending ──assign──▶ Assigned ──progress──▶ InProgress ──complete──▶ Completed
//!    ▲                   │                       │
//!    └─────reassign──────┴───────────────────────┘──fail──▶ Failed
//!                                                 ──cancel─▶ Cancelled
//! ```
//!
//! # Invariants
//!
//! - A task whose dependencies are not all `Completed` never leaves `Pending`
//!   through assignment (enforced by the task manager, which owns the graph).
//! - `progress` is always within `0..=100`, and `progress == 100` only when
//!   the task is `Completed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::agent::{AgentId, Capability};

/// Unique identifier for a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Scheduling tier. Tiers are drained highest first on every scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl TaskPriority {
    /// Tiers in processing order.
    pub const ALL: [TaskPriority; 4] = [
        TaskPriority::Critical,
        TaskPriority::High,
        TaskPriority::Medium,
        TaskPriority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Critical => "critical",
            TaskPriority::High => "high",
            TaskPriority::Medium => "medium",
            TaskPriority::Low => "low",
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(TaskPriority::Critical),
            "high" => Ok(TaskPriority::High),
            "medium" => Ok(TaskPriority::Medium),
            "low" => Ok(TaskPriority::Low),
            other => Err(TaskError::Validation(format!("unknown priority '{}'", other))),
        }
    }
}

/// Coarse work category used to match tasks to agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Specialization {
    Governance,
    Defi,
    Security,
    Community,
    Development,
}

impl Specialization {
    pub const ALL: [Specialization; 5] = [
        Specialization::Governance,
        Specialization::Defi,
        Specialization::Security,
        Specialization::Community,
        Specialization::Development,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Specialization::Governance => "governance",
            Specialization::Defi => "defi",
            Specialization::Security => "security",
            Specialization::Community => "community",
            Specialization::Development => "development",
        }
    }
}

impl fmt::Display for Specialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Specialization {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "governance" => Ok(Specialization::Governance),
            "defi" => Ok(Specialization::Defi),
            "security" => Ok(Specialization::Security),
            "community" => Ok(Specialization::Community),
            "development" => Ok(Specialization::Development),
            other => Err(TaskError::Validation(format!(
                "unknown specialization '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether an agent slot is held while the task sits in this status.
    pub fn holds_agent(&self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "assigned" => Ok(TaskStatus::Assigned),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(TaskError::Validation(format!("unknown status '{}'", other))),
        }
    }
}

/// Why the most recent assignment attempt for a task did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AssignmentFailure {
    /// The task is no longer waiting for an agent.
    NotPending { status: TaskStatus },
    /// At least one dependency has not completed yet.
    DependenciesPending { pending: Vec<TaskId> },
    /// No registered, available agent has the task's specialization.
    NoAgentWithSpecialization { specialization: Specialization },
    /// Every matching agent is already at `max_concurrent_tasks`.
    AllAgentsAtCapacity {
        specialization: Specialization,
        candidates: usize,
    },
}

impl fmt::Display for AssignmentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentFailure::NotPending { status } => {
                write!(f, "task is {} rather than pending", status)
            }
            AssignmentFailure::DependenciesPending { pending } => {
                write!(f, "{} dependenc(ies) not completed", pending.len())
            }
            AssignmentFailure::NoAgentWithSpecialization { specialization } => {
                write!(f, "no available {} agent", specialization)
            }
            AssignmentFailure::AllAgentsAtCapacity {
                specialization,
                candidates,
            } => write!(
                f,
                "all {} {} agent(s) are at capacity",
                candidates, specialization
            ),
        }
    }
}

/// Domain errors raised by task and agent operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Dependency {0} does not exist")]
    UnknownDependency(TaskId),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task {task_id} could not be assigned: {reason}")]
    Unassignable {
        task_id: TaskId,
        reason: AssignmentFailure,
    },

    #[error("Agent {agent_id} still holds {count} active task(s)")]
    AgentBusy { agent_id: AgentId, count: usize },
}

/// Creation request for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: TaskPriority,
    pub specialization: Specialization,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dependencies: BTreeSet<TaskId>,
    #[serde(default)]
    pub estimated_duration_minutes: Option<u32>,
    #[serde(default)]
    pub required_capabilities: BTreeSet<Capability>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, specialization: Specialization) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            priority: TaskPriority::default(),
            specialization,
            deadline: None,
            dependencies: BTreeSet::new(),
            estimated_duration_minutes: None,
            required_capabilities: BTreeSet::new(),
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn depends_on(mut self, task_id: TaskId) -> Self {
        self.dependencies.insert(task_id);
        self
    }

    pub fn requiring(mut self, capability: Capability) -> Self {
        self.required_capabilities.insert(capability);
        self
    }

    pub fn validate(&self) -> Result<(), TaskError> {
        if self.title.trim().is_empty() {
            return Err(TaskError::Validation("title cannot be empty".to_string()));
        }
        if self.estimated_duration_minutes == Some(0) {
            return Err(TaskError::Validation(
                "estimated_duration_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub specialization: Specialization,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub assigned_agent: Option<AgentId>,
    pub status: TaskStatus,
    pub progress: u8,
    pub result: Option<serde_json::Value>,
    pub dependencies: BTreeSet<TaskId>,
    pub estimated_duration_minutes: Option<u32>,
    pub required_capabilities: BTreeSet<Capability>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set on tasks spawned by a coordination rule; points at the task under review.
    pub coordination_of: Option<TaskId>,
    pub last_assignment_failure: Option<AssignmentFailure>,
}

/// Clamp an externally supplied progress figure to `0..=100`.
pub fn clamp_progress(progress: i64) -> u8 {
    progress.clamp(0, 100) as u8
}

impl Task {
    pub fn new(request: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::new(),
            title: request.title,
            description: request.description,
            priority: request.priority,
            specialization: request.specialization,
            created_at: now,
            deadline: request.deadline,
            assigned_agent: None,
            status: TaskStatus::Pending,
            progress: 0,
            result: None,
            dependencies: request.dependencies,
            estimated_duration_minutes: request.estimated_duration_minutes,
            required_capabilities: request.required_capabilities,
            assigned_at: None,
            completed_at: None,
            coordination_of: None,
            last_assignment_failure: None,
        }
    }

    /// Build the advisory review task a coordination rule spawns for `self`.
    pub fn coordination_for(&self, specialization: Specialization, now: DateTime<Utc>) -> Self {
        let mut dependencies = BTreeSet::new();
        dependencies.insert(self.id);

        let mut task = Task::new(
            NewTask {
                title: format!("Coordination: {}", self.title),
                description: format!(
                    "Coordination review of task {} ({})",
                    self.id, self.specialization
                ),
                priority: self.priority,
                specialization,
                deadline: self.deadline,
                dependencies,
                estimated_duration_minutes: None,
                required_capabilities: BTreeSet::new(),
            },
            now,
        );
        task.coordination_of = Some(self.id);
        task
    }

    fn transition_error(&self, to: TaskStatus) -> TaskError {
        TaskError::InvalidTransition {
            task_id: self.id,
            from: self.status,
            to,
        }
    }

    pub fn assign_to(&mut self, agent_id: AgentId, now: DateTime<Utc>) -> Result<(), TaskError> {
        if self.status != TaskStatus::Pending {
            return Err(self.transition_error(TaskStatus::Assigned));
        }
        self.status = TaskStatus::Assigned;
        self.assigned_agent = Some(agent_id);
        self.assigned_at = Some(now);
        self.last_assignment_failure = None;
        Ok(())
    }

    /// Record partial progress (below 100). Promotes `Assigned` to `InProgress`.
    pub fn record_progress(
        &mut self,
        progress: u8,
        result: Option<serde_json::Value>,
    ) -> Result<(), TaskError> {
        if !self.status.holds_agent() {
            return Err(self.transition_error(TaskStatus::InProgress));
        }
        self.progress = progress.min(99);
        if result.is_some() {
            self.result = result;
        }
        self.status = TaskStatus::InProgress;
        Ok(())
    }

    pub fn complete(
        &mut self,
        result: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<(), TaskError> {
        if !self.status.holds_agent() {
            return Err(self.transition_error(TaskStatus::Completed));
        }
        self.status = TaskStatus::Completed;
        self.progress = 100;
        if result.is_some() {
            self.result = result;
        }
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, reason: String, now: DateTime<Utc>) -> Result<(), TaskError> {
        if !self.status.holds_agent() {
            return Err(self.transition_error(TaskStatus::Failed));
        }
        self.status = TaskStatus::Failed;
        self.result = Some(serde_json::json!({ "error": reason }));
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), TaskError> {
        if self.status.is_terminal() {
            return Err(self.transition_error(TaskStatus::Cancelled));
        }
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Detach from the current agent and return to `Pending`.
    ///
    /// Returns the agent that held the task.
    pub fn reset_to_pending(&mut self) -> Result<Option<AgentId>, TaskError> {
        if !self.status.holds_agent() {
            return Err(self.transition_error(TaskStatus::Pending));
        }
        self.status = TaskStatus::Pending;
        self.progress = 0;
        self.assigned_at = None;
        Ok(self.assigned_agent.take())
    }

    /// Delivered no later than the deadline (tasks without one are always on time).
    pub fn is_on_time(&self, at: DateTime<Utc>) -> bool {
        self.deadline.map_or(true, |deadline| at <= deadline)
    }

    /// Minutes between assignment and completion, when both are known.
    pub fn completion_minutes(&self) -> Option<f64> {
        match (self.assigned_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds() as f64 / 60.0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending_task() -> Task {
        Task::new(NewTask::new("Audit vault", Specialization::Security), Utc::now())
    }

    #[test]
    fn test_clamp_progress_bounds() {
        assert_eq!(clamp_progress(-20), 0);
        assert_eq!(clamp_progress(42), 42);
        assert_eq!(clamp_progress(250), 100);
    }

    #[test]
    fn test_priority_and_specialization_parse() {
        assert_eq!("CRITICAL".parse::<TaskPriority>().unwrap(), TaskPriority::Critical);
        assert_eq!("DeFi".parse::<Specialization>().unwrap(), Specialization::Defi);
        assert!("urgent".parse::<TaskPriority>().is_err());
        assert!("marketing".parse::<Specialization>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_assign_requires_pending() {
        let mut task = pending_task();
        let agent = AgentId::new("security_guardian");
        task.assign_to(agent.clone(), Utc::now()).unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);

        let err = task.assign_to(agent, Utc::now()).unwrap_err();
        assert!(matches!(err, TaskError::InvalidTransition { .. }));
    }

    #[test]
    fn test_progress_promotes_and_caps_below_completion() {
        let mut task = pending_task();
        task.assign_to(AgentId::new("security_guardian"), Utc::now()).unwrap();
        task.record_progress(100, None).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.progress, 99);
    }

    #[test]
    fn test_progress_rejected_while_pending() {
        let mut task = pending_task();
        assert!(task.record_progress(10, None).is_err());
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_reset_to_pending_clears_assignment() {
        let mut task = pending_task();
        task.assign_to(AgentId::new("security_guardian"), Utc::now()).unwrap();
        task.record_progress(40, None).unwrap();

        let previous = task.reset_to_pending().unwrap();
        assert_eq!(previous, Some(AgentId::new("security_guardian")));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
        assert!(task.assigned_agent.is_none());
    }

    #[test]
    fn test_on_time_uses_deadline() {
        let now = Utc::now();
        let mut task = pending_task();
        assert!(task.is_on_time(now));

        task.deadline = Some(now - Duration::minutes(5));
        assert!(!task.is_on_time(now));
    }

    #[test]
    fn test_coordination_task_depends_on_original() {
        let original = Task::new(NewTask::new("Rebalance pool", Specialization::Defi), Utc::now());
        let review = original.coordination_for(Specialization::Security, Utc::now());

        assert_eq!(review.title, "Coordination: Rebalance pool");
        assert_eq!(review.specialization, Specialization::Security);
        assert!(review.dependencies.contains(&original.id));
        assert_eq!(review.coordination_of, Some(original.id));
    }

    #[test]
    fn test_new_task_validation() {
        assert!(NewTask::new("  ", Specialization::Community).validate().is_err());
        assert!(NewTask::new("Weekly AMA", Specialization::Community).validate().is_ok());
    }
}
