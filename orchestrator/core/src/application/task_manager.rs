// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Task Manager
//!
//! Owns every task, every scheduling record for agents and the four priority
//! tiers. All state sits behind a single mutex and each public method holds
//! it for its whole read-modify-write, so HTTP handlers and the background
//! scheduler never interleave inside an assignment.
//!
//! ## Assignment
//!
//! A pending task is assignable once every dependency is `Completed`. Among
//! available agents with the task's specialization and a free slot, the one
//! with the highest [`Agent::assignment_score`] wins; equal scores go to the
//! lowest agent id. A failed attempt is stored on the task as
//! `last_assignment_failure` so callers can see why it is still waiting.
//!
//! ## Coordination rules
//!
//! Rules are evaluated once per created task, after the synchronous
//! assignment attempt that critical tasks get. Each match spawns an advisory
//! `Coordination: <title>` task that depends on the original. Spawned tasks
//! are never themselves evaluated.
//!
//! Events are collected while the lock is held and published after it is
//! released.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::agent::{Agent, AgentId};
use crate::domain::clock::Clock;
use crate::domain::coordination::RuleSet;
use crate::domain::events::CoordinationEvent;
use crate::domain::node_config::SchedulerConfig;
use crate::domain::task::{
    clamp_progress, AssignmentFailure, NewTask, Specialization, Task, TaskError, TaskId,
    TaskPriority, TaskStatus,
};
use crate::infrastructure::event_bus::EventBus;

const STALE_REASON: &str = "agent inactive past staleness threshold";

#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    pub staleness_threshold: Duration,
    pub assignments_per_tier_per_tick: usize,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for TaskManagerConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            staleness_threshold: Duration::seconds(
                config.staleness_threshold_seconds.min(u32::MAX as u64) as i64,
            ),
            assignments_per_tier_per_tick: config.assignments_per_tier_per_tick.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignOutcome {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    Completed {
        task_id: TaskId,
        agent_id: Option<AgentId>,
        on_time: bool,
        /// Dependents assigned as a direct result of this completion.
        unblocked: Vec<AssignOutcome>,
    },
    AlreadyCompleted {
        task_id: TaskId,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub specialization: Option<Specialization>,
    pub priority: Option<TaskPriority>,
    pub agent: Option<AgentId>,
}

impl TaskFilter {
    fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self.specialization.map_or(true, |s| task.specialization == s)
            && self.priority.map_or(true, |p| task.priority == p)
            && self
                .agent
                .as_ref()
                .map_or(true, |a| task.assigned_agent.as_ref() == Some(a))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub assigned_tasks: usize,
    pub in_progress_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub cancelled_tasks: usize,
    /// Completed over total, 0 when there are no tasks.
    pub completion_rate: f64,
    pub average_completion_minutes: Option<f64>,
    /// Mean load ratio across registered agents.
    pub agent_utilization: f64,
    pub average_performance_score: f64,
    pub registered_agents: usize,
}

impl SystemMetrics {
    /// Export as gauges on the global `metrics` recorder.
    pub fn publish(&self) {
        for (status, count) in [
            ("pending", self.pending_tasks),
            ("assigned", self.assigned_tasks),
            ("in_progress", self.in_progress_tasks),
            ("completed", self.completed_tasks),
            ("failed", self.failed_tasks),
            ("cancelled", self.cancelled_tasks),
        ] {
            metrics::gauge!("xmrt_tasks_total", "status" => status).set(count as f64);
        }
        metrics::gauge!("xmrt_task_completion_rate").set(self.completion_rate);
        metrics::gauge!("xmrt_agent_utilization").set(self.agent_utilization);
        metrics::gauge!("xmrt_agent_performance_score").set(self.average_performance_score);
        metrics::gauge!("xmrt_registered_agents").set(self.registered_agents as f64);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent: Agent,
    pub load_ratio: f64,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub name: String,
    pub specialization: Specialization,
    pub active_tasks: usize,
    pub max_concurrent_tasks: usize,
    pub performance_score: f64,
    pub availability: bool,
    pub last_active: DateTime<Utc>,
}

impl From<&Agent> for AgentSummary {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id.clone(),
            name: agent.name.clone(),
            specialization: agent.specialization,
            active_tasks: agent.current_tasks.len(),
            max_concurrent_tasks: agent.max_concurrent_tasks,
            performance_score: agent.performance_score,
            availability: agent.availability,
            last_active: agent.last_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub metrics: SystemMetrics,
    pub queue_lengths: BTreeMap<TaskPriority, usize>,
    pub agents: Vec<AgentSummary>,
    pub rules: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickReport {
    pub assigned: Vec<AssignOutcome>,
    pub reassigned: Vec<TaskId>,
    pub metrics: SystemMetrics,
}

#[derive(Default)]
struct State {
    tasks: HashMap<TaskId, Task>,
    agents: BTreeMap<AgentId, Agent>,
    /// Pending task ids per tier, FIFO.
    queues: BTreeMap<TaskPriority, VecDeque<TaskId>>,
    rules_applied: HashSet<TaskId>,
}

impl State {
    fn enqueue(&mut self, task: &Task) {
        self.queues.entry(task.priority).or_default().push_back(task.id);
    }

    fn dequeue(&mut self, task_id: TaskId, priority: TaskPriority) {
        if let Some(queue) = self.queues.get_mut(&priority) {
            queue.retain(|id| *id != task_id);
        }
    }

    fn task(&self, task_id: TaskId) -> Result<&Task, TaskError> {
        self.tasks.get(&task_id).ok_or(TaskError::TaskNotFound(task_id))
    }

    fn task_mut(&mut self, task_id: TaskId) -> Result<&mut Task, TaskError> {
        self.tasks
            .get_mut(&task_id)
            .ok_or(TaskError::TaskNotFound(task_id))
    }

    fn agent_mut(&mut self, agent_id: &AgentId) -> Result<&mut Agent, TaskError> {
        self.agents
            .get_mut(agent_id)
            .ok_or_else(|| TaskError::AgentNotFound(agent_id.clone()))
    }

    fn release(&mut self, agent_id: Option<&AgentId>, task_id: TaskId) {
        if let Some(agent) = agent_id.and_then(|id| self.agents.get_mut(id)) {
            agent.release_slot(task_id);
        }
    }

    fn pending_dependencies(&self, task: &Task) -> Vec<TaskId> {
        task.dependencies
            .iter()
            .filter(|dep| {
                self.tasks
                    .get(*dep)
                    .map_or(true, |d| d.status != TaskStatus::Completed)
            })
            .copied()
            .collect()
    }

    fn metrics(&self) -> SystemMetrics {
        let mut metrics = SystemMetrics {
            total_tasks: self.tasks.len(),
            registered_agents: self.agents.len(),
            ..SystemMetrics::default()
        };

        let mut durations = Vec::new();
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => metrics.pending_tasks += 1,
                TaskStatus::Assigned => metrics.assigned_tasks += 1,
                TaskStatus::InProgress => metrics.in_progress_tasks += 1,
                TaskStatus::Completed => {
                    metrics.completed_tasks += 1;
                    if let Some(minutes) = task.completion_minutes() {
                        durations.push(minutes);
                    }
                }
                TaskStatus::Failed => metrics.failed_tasks += 1,
                TaskStatus::Cancelled => metrics.cancelled_tasks += 1,
            }
        }

        if metrics.total_tasks > 0 {
            metrics.completion_rate = metrics.completed_tasks as f64 / metrics.total_tasks as f64;
        }
        if !durations.is_empty() {
            metrics.average_completion_minutes =
                Some(durations.iter().sum::<f64>() / durations.len() as f64);
        }
        if !self.agents.is_empty() {
            let n = self.agents.len() as f64;
            metrics.agent_utilization = self.agents.values().map(Agent::load_ratio).sum::<f64>() / n;
            metrics.average_performance_score =
                self.agents.values().map(|a| a.performance_score).sum::<f64>() / n;
        }
        metrics
    }
}

pub struct TaskManager {
    state: Mutex<State>,
    rules: RuleSet,
    config: TaskManagerConfig,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl TaskManager {
    pub fn new(
        config: TaskManagerConfig,
        rules: RuleSet,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: Mutex::new(State::default()),
            rules,
            config,
            event_bus,
            clock,
        }
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn emit(&self, events: Vec<CoordinationEvent>) {
        for event in events {
            self.event_bus.publish(event);
        }
    }

    // ---- agents -------------------------------------------------------

    /// Add an agent, or refresh the profile of a known one while keeping its
    /// held tasks and performance score.
    pub fn register_agent(&self, agent: Agent) -> Result<(), TaskError> {
        if agent.id.as_str().trim().is_empty() {
            return Err(TaskError::Validation("agent id cannot be empty".to_string()));
        }
        let mut state = self.state.lock();
        match state.agents.get_mut(&agent.id) {
            Some(existing) => {
                existing.name = agent.name;
                existing.specialization = agent.specialization;
                existing.capabilities = agent.capabilities;
                existing.max_concurrent_tasks = agent
                    .max_concurrent_tasks
                    .max(existing.current_tasks.len())
                    .max(1);
                existing.availability = agent.availability;
                existing.last_active = agent.last_active;
                info!(agent_id = %existing.id, "Agent profile refreshed");
            }
            None => {
                info!(
                    agent_id = %agent.id,
                    specialization = %agent.specialization,
                    max_concurrent_tasks = agent.max_concurrent_tasks,
                    "Agent registered with scheduler"
                );
                state.agents.insert(agent.id.clone(), agent);
            }
        }
        Ok(())
    }

    /// Remove an idle agent.
    pub fn remove_agent(&self, agent_id: &AgentId) -> Result<Agent, TaskError> {
        let mut state = self.state.lock();
        let agent = state
            .agents
            .get(agent_id)
            .ok_or_else(|| TaskError::AgentNotFound(agent_id.clone()))?;
        if !agent.current_tasks.is_empty() {
            return Err(TaskError::AgentBusy {
                agent_id: agent_id.clone(),
                count: agent.current_tasks.len(),
            });
        }
        let removed = state
            .agents
            .remove(agent_id)
            .ok_or_else(|| TaskError::AgentNotFound(agent_id.clone()))?;
        info!(agent_id = %agent_id, "Agent removed from scheduler");
        Ok(removed)
    }

    /// Heartbeat: refresh `last_active`.
    pub fn touch_agent(&self, agent_id: &AgentId) -> Result<(), TaskError> {
        let now = self.clock.now();
        self.state.lock().agent_mut(agent_id)?.touch(now);
        Ok(())
    }

    pub fn set_agent_availability(&self, agent_id: &AgentId, available: bool) -> Result<(), TaskError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let agent = state.agent_mut(agent_id)?;
        agent.availability = available;
        agent.touch(now);
        info!(agent_id = %agent_id, available, "Agent availability changed");
        Ok(())
    }

    // ---- creation -----------------------------------------------------

    pub fn create_task(&self, request: NewTask) -> Result<TaskId, TaskError> {
        request.validate()?;
        let now = self.clock.now();
        let mut events = Vec::new();

        let task_id = {
            let mut state = self.state.lock();
            if let Some(missing) = request
                .dependencies
                .iter()
                .find(|dep| !state.tasks.contains_key(*dep))
            {
                return Err(TaskError::UnknownDependency(*missing));
            }

            let task = Task::new(request, now);
            let task_id = task.id;
            info!(
                task_id = %task_id,
                priority = %task.priority,
                specialization = %task.specialization,
                "Task created"
            );
            events.push(CoordinationEvent::TaskCreated {
                task_id,
                title: task.title.clone(),
                priority: task.priority,
                specialization: task.specialization,
                created_at: now,
            });
            state.enqueue(&task);
            let critical = task.priority == TaskPriority::Critical;
            state.tasks.insert(task_id, task);

            if critical {
                // Failure is recorded on the task; the scheduler retries.
                let _ = self.assign_locked(&mut state, task_id, now, &mut events);
            }
            self.apply_rules_locked(&mut state, task_id, now, &mut events)?;
            task_id
        };

        self.emit(events);
        Ok(task_id)
    }

    pub fn create_tasks(&self, requests: Vec<NewTask>) -> Vec<Result<TaskId, TaskError>> {
        requests
            .into_iter()
            .map(|request| self.create_task(request))
            .collect()
    }

    // ---- assignment ---------------------------------------------------

    pub fn assign_task(&self, task_id: TaskId) -> Result<AssignOutcome, TaskError> {
        let now = self.clock.now();
        let mut events = Vec::new();
        let outcome = {
            let mut state = self.state.lock();
            self.assign_locked(&mut state, task_id, now, &mut events)
        };
        self.emit(events);
        outcome
    }

    fn select_agent(state: &State, task: &Task) -> Result<(AgentId, f64), AssignmentFailure> {
        let candidates: Vec<&Agent> = state
            .agents
            .values()
            .filter(|a| a.specialization == task.specialization && a.availability)
            .collect();
        if candidates.is_empty() {
            return Err(AssignmentFailure::NoAgentWithSpecialization {
                specialization: task.specialization,
            });
        }

        // BTreeMap order means the first agent seen with a given score has
        // the lowest id, so only a strictly better score replaces it.
        let mut best: Option<(&Agent, f64)> = None;
        for agent in candidates.iter().filter(|a| a.has_capacity()) {
            let score = agent.assignment_score(&task.required_capabilities);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((agent, score));
            }
        }

        best.map(|(agent, score)| (agent.id.clone(), score))
            .ok_or(AssignmentFailure::AllAgentsAtCapacity {
                specialization: task.specialization,
                candidates: candidates.len(),
            })
    }

    fn assign_locked(
        &self,
        state: &mut State,
        task_id: TaskId,
        now: DateTime<Utc>,
        events: &mut Vec<CoordinationEvent>,
    ) -> Result<AssignOutcome, TaskError> {
        let task = state.task(task_id)?;
        if task.status != TaskStatus::Pending {
            return Err(TaskError::Unassignable {
                task_id,
                reason: AssignmentFailure::NotPending {
                    status: task.status,
                },
            });
        }

        let pending = state.pending_dependencies(task);
        let selection = if pending.is_empty() {
            Self::select_agent(state, task)
        } else {
            Err(AssignmentFailure::DependenciesPending { pending })
        };

        let (agent_id, score) = match selection {
            Ok(selected) => selected,
            Err(reason) => {
                let task = state.task_mut(task_id)?;
                if task.last_assignment_failure.as_ref() != Some(&reason) {
                    warn!(task_id = %task_id, reason = %reason, "Task could not be assigned");
                    task.last_assignment_failure = Some(reason.clone());
                    events.push(CoordinationEvent::AssignmentDeferred {
                        task_id,
                        failure: reason.clone(),
                        deferred_at: now,
                    });
                } else {
                    debug!(task_id = %task_id, reason = %reason, "Task still waiting");
                }
                return Err(TaskError::Unassignable { task_id, reason });
            }
        };

        if !state.agent_mut(&agent_id)?.take_slot(task_id) {
            // select_agent only returns agents with a free slot
            return Err(TaskError::AgentBusy {
                agent_id: agent_id.clone(),
                count: state.agents.get(&agent_id).map_or(0, |a| a.current_tasks.len()),
            });
        }
        let task = state.task_mut(task_id)?;
        task.assign_to(agent_id.clone(), now)?;
        let title = task.title.clone();
        let priority = task.priority;
        state.dequeue(task_id, priority);

        info!(task_id = %task_id, agent_id = %agent_id, score, "Task assigned");
        metrics::counter!("xmrt_assignments_total").increment(1);
        events.push(CoordinationEvent::TaskAssigned {
            task_id,
            agent_id: agent_id.clone(),
            title,
            score,
            assigned_at: now,
        });

        Ok(AssignOutcome {
            task_id,
            agent_id,
            score,
        })
    }

    // ---- coordination rules -------------------------------------------

    /// Spawn advisory coordination tasks for `task_id`. Returns the spawned
    /// ids; a task is only ever evaluated once, later calls return nothing.
    pub fn apply_coordination_rules(&self, task_id: TaskId) -> Result<Vec<TaskId>, TaskError> {
        let now = self.clock.now();
        let mut events = Vec::new();
        let spawned = {
            let mut state = self.state.lock();
            self.apply_rules_locked(&mut state, task_id, now, &mut events)?
        };
        self.emit(events);
        Ok(spawned)
    }

    fn apply_rules_locked(
        &self,
        state: &mut State,
        task_id: TaskId,
        now: DateTime<Utc>,
        events: &mut Vec<CoordinationEvent>,
    ) -> Result<Vec<TaskId>, TaskError> {
        let original = state.task(task_id)?.clone();
        if original.coordination_of.is_some() || !state.rules_applied.insert(task_id) {
            return Ok(Vec::new());
        }

        let mut spawned = Vec::new();
        for matched in self.rules.matching(&original) {
            if original.assigned_agent.as_ref() == Some(&matched.agent_id) {
                debug!(task_id = %task_id, rule = %matched.rule, "Assignee already covers rule");
                continue;
            }
            let Some(reviewer) = state.agents.get(&matched.agent_id) else {
                warn!(
                    task_id = %task_id,
                    rule = %matched.rule,
                    agent_id = %matched.agent_id,
                    "Required agent not registered; skipping coordination"
                );
                continue;
            };

            let review = original.coordination_for(reviewer.specialization, now);
            let review_id = review.id;
            info!(
                task_id = %review_id,
                parent_task_id = %task_id,
                rule = %matched.rule,
                "Coordination task spawned"
            );
            events.push(CoordinationEvent::TaskCreated {
                task_id: review_id,
                title: review.title.clone(),
                priority: review.priority,
                specialization: review.specialization,
                created_at: now,
            });
            events.push(CoordinationEvent::CoordinationTaskSpawned {
                task_id: review_id,
                parent_task_id: task_id,
                rule: matched.rule.clone(),
                agent_id: matched.agent_id.clone(),
                title: review.title.clone(),
                spawned_at: now,
            });
            state.enqueue(&review);
            state.tasks.insert(review_id, review);
            spawned.push(review_id);
        }
        Ok(spawned)
    }

    // ---- lifecycle ----------------------------------------------------

    /// Record progress. Values are clamped to 0..=100 and 100 completes.
    pub fn update_task_progress(
        &self,
        task_id: TaskId,
        progress: i64,
        result: Option<serde_json::Value>,
    ) -> Result<Task, TaskError> {
        let progress = clamp_progress(progress);
        if progress >= 100 {
            self.complete_task(task_id, result)?;
            return self.get_task(task_id);
        }

        let now = self.clock.now();
        let task = {
            let mut state = self.state.lock();
            let task = state.task_mut(task_id)?;
            task.record_progress(progress, result)?;
            let task = task.clone();
            if let Some(agent) = task.assigned_agent.as_ref().and_then(|id| state.agents.get_mut(id)) {
                agent.touch(now);
            }
            task
        };

        debug!(task_id = %task_id, progress, "Task progress recorded");
        self.event_bus.publish(CoordinationEvent::TaskProgressed {
            task_id,
            progress: task.progress,
            updated_at: now,
        });
        Ok(task)
    }

    /// Complete a task. Repeated calls return `AlreadyCompleted` and change
    /// nothing.
    pub fn complete_task(
        &self,
        task_id: TaskId,
        result: Option<serde_json::Value>,
    ) -> Result<CompletionOutcome, TaskError> {
        let now = self.clock.now();
        let mut events = Vec::new();

        let outcome = {
            let mut state = self.state.lock();
            let task = state.task_mut(task_id)?;
            if task.status == TaskStatus::Completed {
                return Ok(CompletionOutcome::AlreadyCompleted { task_id });
            }
            task.complete(result, now)?;
            let on_time = task.is_on_time(now);
            let agent_id = task.assigned_agent.clone();

            if let Some(agent) = agent_id.as_ref().and_then(|id| state.agents.get_mut(id)) {
                agent.release_slot(task_id);
                agent.record_completion(on_time);
                agent.touch(now);
            }
            info!(task_id = %task_id, on_time, "Task completed");
            events.push(CoordinationEvent::TaskCompleted {
                task_id,
                agent_id: agent_id.clone(),
                on_time,
                completed_at: now,
            });

            let dependents: Vec<TaskId> = TaskPriority::ALL
                .iter()
                .filter_map(|tier| state.queues.get(tier))
                .flat_map(|queue| queue.iter().copied())
                .filter(|id| {
                    state
                        .tasks
                        .get(id)
                        .map_or(false, |t| t.dependencies.contains(&task_id))
                })
                .collect();

            let unblocked = dependents
                .into_iter()
                .filter_map(|id| self.assign_locked(&mut state, id, now, &mut events).ok())
                .collect();

            CompletionOutcome::Completed {
                task_id,
                agent_id,
                on_time,
                unblocked,
            }
        };

        self.emit(events);
        Ok(outcome)
    }

    /// Fail an assigned or in-progress task. The agent score is unchanged.
    pub fn fail_task(&self, task_id: TaskId, reason: impl Into<String>) -> Result<Task, TaskError> {
        let reason = reason.into();
        let now = self.clock.now();
        let task = {
            let mut state = self.state.lock();
            let task = state.task_mut(task_id)?;
            task.fail(reason.clone(), now)?;
            let task = task.clone();
            state.release(task.assigned_agent.as_ref(), task_id);
            state.dequeue(task_id, task.priority);
            task
        };

        warn!(task_id = %task_id, reason = %reason, "Task failed");
        self.event_bus.publish(CoordinationEvent::TaskFailed {
            task_id,
            agent_id: task.assigned_agent.clone(),
            reason,
            failed_at: now,
        });
        Ok(task)
    }

    pub fn cancel_task(&self, task_id: TaskId) -> Result<Task, TaskError> {
        let now = self.clock.now();
        let task = {
            let mut state = self.state.lock();
            let task = state.task_mut(task_id)?;
            let held = task.status.holds_agent();
            task.cancel(now)?;
            let task = task.clone();
            if held {
                state.release(task.assigned_agent.as_ref(), task_id);
            }
            state.dequeue(task_id, task.priority);
            task
        };

        info!(task_id = %task_id, "Task cancelled");
        self.event_bus.publish(CoordinationEvent::TaskCancelled {
            task_id,
            cancelled_at: now,
        });
        Ok(task)
    }

    /// Detach from the current agent and put the task back at the tail of
    /// its tier.
    pub fn reassign_task(&self, task_id: TaskId, reason: impl Into<String>) -> Result<Task, TaskError> {
        let now = self.clock.now();
        let mut events = Vec::new();
        let task = {
            let mut state = self.state.lock();
            Self::reassign_locked(&mut state, task_id, reason.into(), now, &mut events)?
        };
        self.emit(events);
        Ok(task)
    }

    fn reassign_locked(
        state: &mut State,
        task_id: TaskId,
        reason: String,
        now: DateTime<Utc>,
        events: &mut Vec<CoordinationEvent>,
    ) -> Result<Task, TaskError> {
        let task = state.task_mut(task_id)?;
        let previous_agent = task.reset_to_pending()?;
        let task = task.clone();
        state.release(previous_agent.as_ref(), task_id);
        state.enqueue(&task);

        warn!(
            task_id = %task_id,
            previous_agent = ?previous_agent,
            reason = %reason,
            "Task returned to queue"
        );
        metrics::counter!("xmrt_reassignments_total").increment(1);
        events.push(CoordinationEvent::TaskReassigned {
            task_id,
            previous_agent,
            reason,
            reassigned_at: now,
        });
        Ok(task)
    }

    /// Reassign held tasks whose agent has been silent for longer than the
    /// staleness threshold. Silence is measured from the later of the
    /// agent's last report and the assignment itself, so an agent that never
    /// acknowledges an assignment loses it too. Agents found stale are marked
    /// unavailable until they report in again.
    pub fn check_stuck_tasks(&self) -> Vec<TaskId> {
        let now = self.clock.now();
        let cutoff = now - self.config.staleness_threshold;
        let mut events = Vec::new();

        let reassigned = {
            let mut state = self.state.lock();
            let mut stuck: Vec<(DateTime<Utc>, TaskId, Option<AgentId>)> = state
                .tasks
                .values()
                .filter(|t| t.status.holds_agent())
                .filter(|t| {
                    let agent = t.assigned_agent.as_ref().and_then(|id| state.agents.get(id));
                    match agent {
                        Some(agent) => {
                            let heard_from = t
                                .assigned_at
                                .map_or(agent.last_active, |at| at.max(agent.last_active));
                            heard_from < cutoff
                        }
                        None => true,
                    }
                })
                .map(|t| (t.created_at, t.id, t.assigned_agent.clone()))
                .collect();
            stuck.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

            let mut silenced = BTreeSet::new();
            let reassigned: Vec<TaskId> = stuck
                .into_iter()
                .filter_map(|(_, id, agent_id)| {
                    let task =
                        Self::reassign_locked(&mut state, id, STALE_REASON.to_string(), now, &mut events)
                            .ok()?;
                    silenced.extend(agent_id);
                    Some(task.id)
                })
                .collect();

            for agent_id in silenced {
                if let Some(agent) = state.agents.get_mut(&agent_id) {
                    if agent.availability {
                        agent.availability = false;
                        warn!(agent_id = %agent_id, "Agent stale, withholding new work until it reports in");
                        events.push(CoordinationEvent::AgentStatusChanged {
                            agent_id: agent_id.clone(),
                            status: "stale".to_string(),
                            changed_at: now,
                        });
                    }
                }
            }
            reassigned
        };

        self.emit(events);
        reassigned
    }

    /// Walk each tier highest first and make at most
    /// `assignments_per_tier_per_tick` assignments in it.
    pub fn process_queue_tick(&self) -> Vec<AssignOutcome> {
        let now = self.clock.now();
        let mut events = Vec::new();
        let mut assigned = Vec::new();

        {
            let mut state = self.state.lock();
            for tier in TaskPriority::ALL {
                let queued: Vec<TaskId> = state
                    .queues
                    .get(&tier)
                    .map(|q| q.iter().copied().collect())
                    .unwrap_or_default();

                let mut made = 0;
                for task_id in queued {
                    if made >= self.config.assignments_per_tier_per_tick {
                        break;
                    }
                    if let Ok(outcome) = self.assign_locked(&mut state, task_id, now, &mut events) {
                        assigned.push(outcome);
                        made += 1;
                    }
                }
            }
        }

        self.emit(events);
        assigned
    }

    /// One scheduler pass.
    pub fn tick(&self) -> TickReport {
        let assigned = self.process_queue_tick();
        let reassigned = self.check_stuck_tasks();
        let metrics = self.metrics();
        metrics.publish();
        debug!(
            assigned = assigned.len(),
            reassigned = reassigned.len(),
            pending = metrics.pending_tasks,
            "Scheduler tick"
        );
        TickReport {
            assigned,
            reassigned,
            metrics,
        }
    }

    // ---- queries ------------------------------------------------------

    pub fn get_task(&self, task_id: TaskId) -> Result<Task, TaskError> {
        self.state.lock().task(task_id).cloned()
    }

    /// Matching tasks, oldest first.
    pub fn list_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .state
            .lock()
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    pub fn get_agent(&self, agent_id: &AgentId) -> Result<Agent, TaskError> {
        self.state
            .lock()
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| TaskError::AgentNotFound(agent_id.clone()))
    }

    pub fn list_agents(&self) -> Vec<Agent> {
        self.state.lock().agents.values().cloned().collect()
    }

    pub fn agent_status(&self, agent_id: &AgentId) -> Result<AgentStatus, TaskError> {
        let state = self.state.lock();
        let agent = state
            .agents
            .get(agent_id)
            .ok_or_else(|| TaskError::AgentNotFound(agent_id.clone()))?;
        let tasks = agent
            .current_tasks
            .iter()
            .filter_map(|id| state.tasks.get(id).cloned())
            .collect();
        Ok(AgentStatus {
            agent: agent.clone(),
            load_ratio: agent.load_ratio(),
            tasks,
        })
    }

    pub fn system_status(&self) -> SystemStatus {
        let state = self.state.lock();
        SystemStatus {
            metrics: state.metrics(),
            queue_lengths: TaskPriority::ALL
                .iter()
                .map(|tier| (*tier, state.queues.get(tier).map_or(0, VecDeque::len)))
                .collect(),
            agents: state.agents.values().map(AgentSummary::from).collect(),
            rules: self.rules.names().into_iter().map(str::to_string).collect(),
            generated_at: self.clock.now(),
        }
    }

    pub fn metrics(&self) -> SystemMetrics {
        self.state.lock().metrics()
    }

    /// Pending ids in a tier, in the order they will be considered.
    pub fn queued(&self, priority: TaskPriority) -> Vec<TaskId> {
        self.state
            .lock()
            .queues
            .get(&priority)
            .map(|q| q.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{Capability, CapabilityVocabulary};
    use crate::domain::clock::ManualClock;
    use crate::domain::coordination::SECURITY_GUARDIAN;

    fn manager() -> (TaskManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let manager = TaskManager::new(
            TaskManagerConfig::default(),
            RuleSet::standard(),
            EventBus::new(256),
            clock.clone(),
        );
        (manager, clock)
    }

    fn agent(id: &str, specialization: Specialization, capacity: usize) -> Agent {
        Agent::new(
            AgentId::new(id),
            id,
            specialization,
            Default::default(),
            Utc::now(),
        )
        .with_max_concurrent_tasks(capacity)
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let (manager, _) = manager();
        let err = manager
            .create_task(NewTask::new("Deploy", Specialization::Development).depends_on(TaskId::new()))
            .unwrap_err();
        assert!(matches!(err, TaskError::UnknownDependency(_)));
        assert!(manager.list_tasks(&TaskFilter::default()).is_empty());
    }

    #[test]
    fn test_critical_task_assigned_on_creation() {
        let (manager, _) = manager();
        manager.register_agent(agent("dev", Specialization::Development, 3)).unwrap();

        let id = manager
            .create_task(NewTask::new("Hotfix", Specialization::Development).with_priority(TaskPriority::Critical))
            .unwrap();
        let task = manager.get_task(id).unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.assigned_agent, Some(AgentId::new("dev")));
        assert!(manager.queued(TaskPriority::Critical).is_empty());
    }

    #[test]
    fn test_non_critical_task_waits_for_tick() {
        let (manager, _) = manager();
        manager.register_agent(agent("dev", Specialization::Development, 3)).unwrap();
        let id = manager
            .create_task(NewTask::new("Refactor", Specialization::Development))
            .unwrap();
        assert_eq!(manager.get_task(id).unwrap().status, TaskStatus::Pending);

        let assigned = manager.process_queue_tick();
        assert_eq!(assigned.len(), 1);
        assert_eq!(manager.get_task(id).unwrap().status, TaskStatus::Assigned);
    }

    #[test]
    fn test_failure_reason_recorded() {
        let (manager, _) = manager();
        let id = manager
            .create_task(NewTask::new("Write docs", Specialization::Development))
            .unwrap();

        let err = manager.assign_task(id).unwrap_err();
        assert!(matches!(
            err,
            TaskError::Unassignable {
                reason: AssignmentFailure::NoAgentWithSpecialization { .. },
                ..
            }
        ));
        assert_eq!(
            manager.get_task(id).unwrap().last_assignment_failure,
            Some(AssignmentFailure::NoAgentWithSpecialization {
                specialization: Specialization::Development
            })
        );
    }

    #[test]
    fn test_capacity_exhaustion_reported() {
        let (manager, _) = manager();
        manager.register_agent(agent("dev", Specialization::Development, 1)).unwrap();
        let first = manager.create_task(NewTask::new("One", Specialization::Development)).unwrap();
        let second = manager.create_task(NewTask::new("Two", Specialization::Development)).unwrap();

        manager.assign_task(first).unwrap();
        let err = manager.assign_task(second).unwrap_err();
        assert!(matches!(
            err,
            TaskError::Unassignable {
                reason: AssignmentFailure::AllAgentsAtCapacity { candidates: 1, .. },
                ..
            }
        ));
    }

    #[test]
    fn test_unavailable_agent_not_considered() {
        let (manager, _) = manager();
        manager.register_agent(agent("dev", Specialization::Development, 3)).unwrap();
        manager.set_agent_availability(&AgentId::new("dev"), false).unwrap();
        let id = manager.create_task(NewTask::new("Test", Specialization::Development)).unwrap();
        assert!(manager.assign_task(id).is_err());
    }

    #[test]
    fn test_tie_breaks_by_agent_id() {
        let (manager, _) = manager();
        manager.register_agent(agent("dev_b", Specialization::Development, 3)).unwrap();
        manager.register_agent(agent("dev_a", Specialization::Development, 3)).unwrap();
        let id = manager.create_task(NewTask::new("Review", Specialization::Development)).unwrap();
        assert_eq!(manager.assign_task(id).unwrap().agent_id, AgentId::new("dev_a"));
    }

    #[test]
    fn test_capability_match_raises_score() {
        let (manager, _) = manager();
        let vocabulary = CapabilityVocabulary::default();
        let mut skilled = agent("dev_z", Specialization::Development, 3);
        skilled.capabilities = vocabulary.resolve(["code_review"]).unwrap();
        manager.register_agent(agent("dev_a", Specialization::Development, 3)).unwrap();
        manager.register_agent(skilled).unwrap();

        let id = manager
            .create_task(
                NewTask::new("Review PR", Specialization::Development)
                    .requiring(Capability::parse("code_review").unwrap()),
            )
            .unwrap();
        let outcome = manager.assign_task(id).unwrap();
        assert_eq!(outcome.agent_id, AgentId::new("dev_z"));
        assert!((outcome.score - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_progress_on_pending_task_rejected() {
        let (manager, _) = manager();
        let id = manager.create_task(NewTask::new("Idle", Specialization::Community)).unwrap();
        assert!(matches!(
            manager.update_task_progress(id, 50, None),
            Err(TaskError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_progress_touches_agent() {
        let (manager, clock) = manager();
        manager.register_agent(agent("dev", Specialization::Development, 3)).unwrap();
        let id = manager.create_task(NewTask::new("Build", Specialization::Development)).unwrap();
        manager.assign_task(id).unwrap();

        clock.advance(Duration::minutes(30));
        let task = manager.update_task_progress(id, 40, None).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(manager.get_agent(&AgentId::new("dev")).unwrap().last_active, clock.now());
    }

    #[test]
    fn test_fail_releases_slot_without_score_change() {
        let (manager, _) = manager();
        manager.register_agent(agent("dev", Specialization::Development, 3)).unwrap();
        let id = manager.create_task(NewTask::new("Migrate", Specialization::Development)).unwrap();
        manager.assign_task(id).unwrap();

        let task = manager.fail_task(id, "database unreachable").unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        let dev = manager.get_agent(&AgentId::new("dev")).unwrap();
        assert!(dev.current_tasks.is_empty());
        assert_eq!(dev.performance_score, 1.0);
    }

    #[test]
    fn test_cancel_pending_task_leaves_queue() {
        let (manager, _) = manager();
        let id = manager.create_task(NewTask::new("Later", Specialization::Community)).unwrap();
        manager.cancel_task(id).unwrap();
        assert!(manager.queued(TaskPriority::Medium).is_empty());
        assert!(manager.cancel_task(id).is_err());
    }

    #[test]
    fn test_remove_busy_agent_rejected() {
        let (manager, _) = manager();
        manager.register_agent(agent("dev", Specialization::Development, 3)).unwrap();
        let id = manager.create_task(NewTask::new("Busy", Specialization::Development)).unwrap();
        manager.assign_task(id).unwrap();

        assert!(matches!(
            manager.remove_agent(&AgentId::new("dev")),
            Err(TaskError::AgentBusy { count: 1, .. })
        ));
        manager.complete_task(id, None).unwrap();
        assert!(manager.remove_agent(&AgentId::new("dev")).is_ok());
    }

    #[test]
    fn test_rules_skip_unregistered_reviewer() {
        let (manager, _) = manager();
        manager.register_agent(agent("defi_specialist", Specialization::Defi, 3)).unwrap();
        let id = manager.create_task(NewTask::new("Swap", Specialization::Defi)).unwrap();

        assert_eq!(manager.list_tasks(&TaskFilter::default()).len(), 1);
        assert!(manager.apply_coordination_rules(id).unwrap().is_empty());
    }

    #[test]
    fn test_rules_evaluated_once() {
        let (manager, _) = manager();
        manager.register_agent(agent(SECURITY_GUARDIAN, Specialization::Security, 3)).unwrap();
        let id = manager.create_task(NewTask::new("Swap", Specialization::Defi)).unwrap();

        assert_eq!(manager.list_tasks(&TaskFilter::default()).len(), 2);
        assert!(manager.apply_coordination_rules(id).unwrap().is_empty());
        assert_eq!(manager.list_tasks(&TaskFilter::default()).len(), 2);
    }

    #[test]
    fn test_metrics_summarize_state() {
        let (manager, clock) = manager();
        manager.register_agent(agent("dev", Specialization::Development, 2)).unwrap();
        let done = manager.create_task(NewTask::new("Done", Specialization::Development)).unwrap();
        let _waiting = manager.create_task(NewTask::new("Waiting", Specialization::Community)).unwrap();
        manager.assign_task(done).unwrap();
        clock.advance(Duration::minutes(90));
        manager.complete_task(done, None).unwrap();

        let metrics = manager.metrics();
        assert_eq!(metrics.total_tasks, 2);
        assert_eq!(metrics.completed_tasks, 1);
        assert_eq!(metrics.pending_tasks, 1);
        assert!((metrics.completion_rate - 0.5).abs() < 1e-9);
        assert_eq!(metrics.average_completion_minutes, Some(90.0));
        assert_eq!(metrics.agent_utilization, 0.0);
        assert!((metrics.average_performance_score - 1.05).abs() < 1e-9);
    }

    #[test]
    fn test_system_status_reports_tiers() {
        let (manager, _) = manager();
        manager.create_task(NewTask::new("Low", Specialization::Community).with_priority(TaskPriority::Low)).unwrap();
        manager.create_task(NewTask::new("High", Specialization::Community).with_priority(TaskPriority::High)).unwrap();

        let status = manager.system_status();
        assert_eq!(status.queue_lengths[&TaskPriority::Low], 1);
        assert_eq!(status.queue_lengths[&TaskPriority::High], 1);
        assert_eq!(status.queue_lengths[&TaskPriority::Critical], 0);
        assert_eq!(status.rules, vec!["security_veto", "governance_community"]);
    }
}
