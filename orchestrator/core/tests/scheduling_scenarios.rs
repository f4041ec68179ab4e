// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end scheduling scenarios against a `TaskManager` driven by a
//! manual clock: synchronous critical assignment, coordination spawning,
//! capacity back-pressure and staleness recovery.

use std::sync::Arc;

use chrono::{Duration, Utc};
use xmrt_core::application::task_manager::{CompletionOutcome, TaskFilter, TaskManager, TaskManagerConfig};
use xmrt_core::domain::agent::{Agent, AgentId};
use xmrt_core::domain::clock::{Clock, ManualClock};
use xmrt_core::domain::coordination::RuleSet;
use xmrt_core::domain::events::CoordinationEvent;
use xmrt_core::domain::node_config::CoordinatorConfig;
use xmrt_core::domain::task::{NewTask, Specialization, TaskPriority, TaskStatus};
use xmrt_core::infrastructure::event_bus::EventBus;

struct Harness {
    manager: TaskManager,
    clock: Arc<ManualClock>,
    bus: EventBus,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let bus = EventBus::new(512);
    let manager = TaskManager::new(
        TaskManagerConfig::default(),
        RuleSet::standard(),
        bus.clone(),
        clock.clone(),
    );
    Harness { manager, clock, bus }
}

/// The four default personas, registered at the harness clock's time.
fn seed_roster(h: &Harness) {
    for agent in CoordinatorConfig::default().roster_agents(h.clock.now()).unwrap() {
        h.manager.register_agent(agent).unwrap();
    }
}

fn single_agent(h: &Harness, id: &str, specialization: Specialization, capacity: usize) {
    h.manager
        .register_agent(
            Agent::new(AgentId::new(id), id, specialization, Default::default(), h.clock.now())
                .with_max_concurrent_tasks(capacity),
        )
        .unwrap();
}

#[test]
fn critical_task_is_assigned_within_create_call() {
    let h = harness();
    single_agent(&h, "governor", Specialization::Governance, 3);

    let id = h
        .manager
        .create_task(
            NewTask::new("Emergency treasury freeze", Specialization::Governance)
                .with_priority(TaskPriority::Critical),
        )
        .unwrap();

    let task = h.manager.get_task(id).unwrap();
    assert_eq!(task.status, TaskStatus::Assigned);
    assert_eq!(task.assigned_agent, Some(AgentId::new("governor")));
    assert!(task.last_assignment_failure.is_none());
    assert_eq!(
        h.manager.get_agent(&AgentId::new("governor")).unwrap().current_tasks,
        vec![id]
    );
}

#[test]
fn defi_task_spawns_one_security_review() {
    let h = harness();
    seed_roster(&h);
    let mut events = h.bus.subscribe();

    let id = h
        .manager
        .create_task(NewTask::new("Rebalance liquidity pool", Specialization::Defi))
        .unwrap();

    let spawned: Vec<_> = h
        .manager
        .list_tasks(&TaskFilter::default())
        .into_iter()
        .filter(|t| t.id != id)
        .collect();
    assert_eq!(spawned.len(), 1);

    let review = &spawned[0];
    assert_eq!(review.title, "Coordination: Rebalance liquidity pool");
    assert_eq!(review.specialization, Specialization::Security);
    assert!(review.dependencies.contains(&id));
    assert_eq!(review.coordination_of, Some(id));
    assert_eq!(review.status, TaskStatus::Pending);

    let mut saw_spawn = false;
    while let Ok(event) = events.try_recv() {
        if let CoordinationEvent::CoordinationTaskSpawned { parent_task_id, rule, agent_id, .. } = event {
            assert_eq!(parent_task_id, id);
            assert_eq!(rule, "security_veto");
            assert_eq!(agent_id, AgentId::new("security_guardian"));
            saw_spawn = true;
        }
    }
    assert!(saw_spawn);
}

#[test]
fn security_review_waits_for_original_then_runs() {
    let h = harness();
    seed_roster(&h);

    let original = h
        .manager
        .create_task(NewTask::new("Deploy vault strategy", Specialization::Defi))
        .unwrap();
    let review = h
        .manager
        .list_tasks(&TaskFilter {
            specialization: Some(Specialization::Security),
            ..TaskFilter::default()
        })[0]
        .id;

    // Only the original can go out; the review is gated on it.
    let assigned = h.manager.process_queue_tick();
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].task_id, original);
    assert_eq!(h.manager.get_task(review).unwrap().status, TaskStatus::Pending);

    let outcome = h.manager.complete_task(original, None).unwrap();
    match outcome {
        CompletionOutcome::Completed { unblocked, .. } => {
            assert_eq!(unblocked.len(), 1);
            assert_eq!(unblocked[0].task_id, review);
            assert_eq!(unblocked[0].agent_id, AgentId::new("security_guardian"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn governance_task_spawns_community_coordination() {
    let h = harness();
    seed_roster(&h);

    let id = h
        .manager
        .create_task(NewTask::new("Ratify proposal 31", Specialization::Governance))
        .unwrap();
    let community = h.manager.list_tasks(&TaskFilter {
        specialization: Some(Specialization::Community),
        ..TaskFilter::default()
    });
    assert_eq!(community.len(), 1);
    assert_eq!(community[0].coordination_of, Some(id));
}

#[test]
fn coordination_tasks_do_not_spawn_further_reviews() {
    let h = harness();
    seed_roster(&h);
    h.manager
        .create_task(NewTask::new("Bridge assets", Specialization::Defi))
        .unwrap();

    // One original plus one review, and nothing else no matter how often the
    // scheduler runs.
    for _ in 0..3 {
        h.manager.tick();
    }
    assert_eq!(h.manager.list_tasks(&TaskFilter::default()).len(), 2);
}

#[test]
fn saturated_agent_leaves_extra_task_pending_until_slot_frees() {
    let h = harness();
    single_agent(&h, "defi_specialist", Specialization::Defi, 3);

    let held: Vec<_> = (0..3)
        .map(|i| {
            let id = h
                .manager
                .create_task(NewTask::new(format!("Position {}", i), Specialization::Defi))
                .unwrap();
            h.manager.assign_task(id).unwrap();
            id
        })
        .collect();

    let first = h
        .manager
        .create_task(NewTask::new("Harvest yield", Specialization::Defi))
        .unwrap();
    let second = h
        .manager
        .create_task(NewTask::new("Hedge exposure", Specialization::Defi))
        .unwrap();

    h.manager.tick();
    assert_eq!(h.manager.get_task(first).unwrap().status, TaskStatus::Pending);
    assert_eq!(h.manager.get_task(second).unwrap().status, TaskStatus::Pending);
    assert!(h.manager.get_task(first).unwrap().last_assignment_failure.is_some());

    h.manager.complete_task(held[0], None).unwrap();
    h.manager.tick();

    // The oldest waiting task takes the freed slot, the other still waits.
    assert_eq!(h.manager.get_task(first).unwrap().status, TaskStatus::Assigned);
    assert_eq!(h.manager.get_task(second).unwrap().status, TaskStatus::Pending);
    let agent = h.manager.get_agent(&AgentId::new("defi_specialist")).unwrap();
    assert_eq!(agent.current_tasks.len(), 3);
}

#[test]
fn stale_agent_loses_in_progress_task_without_score_change() {
    let h = harness();
    single_agent(&h, "security_guardian", Specialization::Security, 3);

    let id = h
        .manager
        .create_task(NewTask::new("Audit bridge contract", Specialization::Security))
        .unwrap();
    h.manager.assign_task(id).unwrap();
    h.manager.update_task_progress(id, 35, None).unwrap();
    let score_before = h
        .manager
        .get_agent(&AgentId::new("security_guardian"))
        .unwrap()
        .performance_score;

    h.clock.advance(Duration::minutes(61));
    let reassigned = h.manager.check_stuck_tasks();
    assert_eq!(reassigned, vec![id]);

    let task = h.manager.get_task(id).unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.progress, 0);
    assert!(task.assigned_agent.is_none());

    let agent = h.manager.get_agent(&AgentId::new("security_guardian")).unwrap();
    assert!(agent.current_tasks.is_empty());
    assert_eq!(agent.performance_score, score_before);
    assert_eq!(h.manager.queued(TaskPriority::Medium), vec![id]);
}

#[test]
fn stale_agent_does_not_get_its_task_back() {
    let h = harness();
    single_agent(&h, "security_guardian", Specialization::Security, 3);
    let guardian = AgentId::new("security_guardian");
    let id = h
        .manager
        .create_task(NewTask::new("Trace exploit funds", Specialization::Security))
        .unwrap();
    h.manager.assign_task(id).unwrap();
    h.manager.update_task_progress(id, 20, None).unwrap();
    let last_heard = h.manager.get_agent(&guardian).unwrap().last_active;

    h.clock.advance(Duration::minutes(61));
    assert_eq!(h.manager.tick().reassigned, vec![id]);

    h.clock.advance(Duration::seconds(30));
    let report = h.manager.tick();
    assert!(report.assigned.is_empty());
    let task = h.manager.get_task(id).unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.last_assignment_failure.is_some());

    let agent = h.manager.get_agent(&guardian).unwrap();
    assert!(!agent.availability);
    assert!(agent.current_tasks.is_empty());
    assert_eq!(agent.last_active, last_heard);

    // Still queued, not stranded, hours later
    h.clock.advance(Duration::hours(5));
    h.manager.tick();
    assert_eq!(h.manager.get_task(id).unwrap().status, TaskStatus::Pending);
    assert_eq!(h.manager.queued(TaskPriority::Medium), vec![id]);

    // Reporting in makes the agent schedulable again
    h.manager.set_agent_availability(&guardian, true).unwrap();
    let report = h.manager.tick();
    assert_eq!(report.assigned.len(), 1);
    assert_eq!(report.assigned[0].task_id, id);
    assert_eq!(h.manager.get_task(id).unwrap().assigned_agent, Some(guardian));
}

#[test]
fn unacknowledged_assignment_is_reclaimed() {
    let h = harness();
    single_agent(&h, "governor", Specialization::Governance, 3);
    let id = h
        .manager
        .create_task(NewTask::new("Tally quorum", Specialization::Governance))
        .unwrap();

    h.clock.advance(Duration::minutes(30));
    h.manager.assign_task(id).unwrap();

    // Assignment time counts as the start of the silence window
    h.clock.advance(Duration::minutes(45));
    assert!(h.manager.check_stuck_tasks().is_empty());

    h.clock.advance(Duration::minutes(20));
    assert_eq!(h.manager.check_stuck_tasks(), vec![id]);
    assert_eq!(h.manager.get_task(id).unwrap().status, TaskStatus::Pending);
    assert!(h
        .manager
        .get_agent(&AgentId::new("governor"))
        .unwrap()
        .current_tasks
        .is_empty());
}

#[test]
fn recent_activity_keeps_task_in_place() {
    let h = harness();
    single_agent(&h, "security_guardian", Specialization::Security, 3);
    let id = h
        .manager
        .create_task(NewTask::new("Scan mempool", Specialization::Security))
        .unwrap();
    h.manager.assign_task(id).unwrap();
    h.manager.update_task_progress(id, 10, None).unwrap();

    h.clock.advance(Duration::minutes(45));
    h.manager.touch_agent(&AgentId::new("security_guardian")).unwrap();
    h.clock.advance(Duration::minutes(45));

    assert!(h.manager.check_stuck_tasks().is_empty());
    assert_eq!(h.manager.get_task(id).unwrap().status, TaskStatus::InProgress);
}

#[test]
fn tick_respects_per_tier_limit_and_tier_order() {
    let h = harness();
    single_agent(&h, "builder", Specialization::Development, 10);

    let low = h
        .manager
        .create_task(NewTask::new("Tidy docs", Specialization::Development).with_priority(TaskPriority::Low))
        .unwrap();
    let high_a = h
        .manager
        .create_task(NewTask::new("Fix build", Specialization::Development).with_priority(TaskPriority::High))
        .unwrap();
    let high_b = h
        .manager
        .create_task(NewTask::new("Fix tests", Specialization::Development).with_priority(TaskPriority::High))
        .unwrap();

    let report = h.manager.tick();
    let assigned: Vec<_> = report.assigned.iter().map(|a| a.task_id).collect();
    assert_eq!(assigned, vec![high_a, low]);
    assert_eq!(h.manager.get_task(high_b).unwrap().status, TaskStatus::Pending);

    let report = h.manager.tick();
    assert_eq!(report.assigned.len(), 1);
    assert_eq!(report.assigned[0].task_id, high_b);
}

#[test]
fn late_completion_lowers_score() {
    let h = harness();
    single_agent(&h, "community_manager", Specialization::Community, 3);
    let deadline = h.clock.now() + Duration::hours(1);
    let id = h
        .manager
        .create_task(NewTask::new("Publish AMA recap", Specialization::Community).with_deadline(deadline))
        .unwrap();
    h.manager.assign_task(id).unwrap();

    h.clock.advance(Duration::hours(2));
    match h.manager.complete_task(id, None).unwrap() {
        CompletionOutcome::Completed { on_time, .. } => assert!(!on_time),
        other => panic!("unexpected outcome: {:?}", other),
    }
    let agent = h.manager.get_agent(&AgentId::new("community_manager")).unwrap();
    assert!((agent.performance_score - 0.95).abs() < 1e-9);
}
