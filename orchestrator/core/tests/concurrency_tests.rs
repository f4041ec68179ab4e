// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

// The manager is shared between HTTP handlers and the scheduler loop. These
// tests hammer one instance from several threads and check that slot
// bookkeeping survives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};
use xmrt_core::application::task_manager::{CompletionOutcome, TaskFilter, TaskManager, TaskManagerConfig};
use xmrt_core::domain::agent::{Agent, AgentId};
use xmrt_core::domain::clock::{Clock, ManualClock};
use xmrt_core::domain::coordination::RuleSet;
use xmrt_core::domain::task::{NewTask, Specialization, TaskPriority, TaskStatus};
use xmrt_core::infrastructure::event_bus::EventBus;

const ROUNDS: usize = 200;

fn shared_manager() -> (Arc<TaskManager>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let manager = TaskManager::new(
        TaskManagerConfig::default(),
        RuleSet::empty(),
        EventBus::new(64),
        clock.clone(),
    );
    for (id, specialization) in [
        ("dev_a", Specialization::Development),
        ("dev_b", Specialization::Development),
        ("sec_a", Specialization::Security),
        ("gov_a", Specialization::Governance),
    ] {
        manager
            .register_agent(
                Agent::new(AgentId::new(id), id, specialization, Default::default(), clock.now())
                    .with_max_concurrent_tasks(2),
            )
            .unwrap();
    }
    (Arc::new(manager), clock)
}

fn assert_consistent(manager: &TaskManager) {
    for agent in manager.list_agents() {
        assert!(agent.current_tasks.len() <= agent.max_concurrent_tasks);
        for task_id in &agent.current_tasks {
            let task = manager.get_task(*task_id).unwrap();
            assert!(task.status.holds_agent());
            assert_eq!(task.assigned_agent.as_ref(), Some(&agent.id));
        }
    }
    let mut held = std::collections::HashSet::new();
    for task in manager.list_tasks(&TaskFilter::default()) {
        if task.status.holds_agent() {
            let agent = manager.get_agent(task.assigned_agent.as_ref().unwrap()).unwrap();
            assert!(agent.current_tasks.contains(&task.id));
            assert!(held.insert(task.id));
        } else {
            assert!(task.assigned_agent.is_none() || task.status.is_terminal());
        }
    }
}

fn held_tasks(manager: &TaskManager) -> Vec<xmrt_core::domain::task::TaskId> {
    manager
        .list_tasks(&TaskFilter::default())
        .into_iter()
        .filter(|t| t.status.holds_agent())
        .map(|t| t.id)
        .collect()
}

#[test]
fn concurrent_lifecycle_keeps_slots_consistent() {
    let (manager, clock) = shared_manager();
    let completions = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(5));
    let mut workers = Vec::new();

    for (n, specialization) in [Specialization::Development, Specialization::Security]
        .into_iter()
        .enumerate()
    {
        let manager = manager.clone();
        let barrier = barrier.clone();
        workers.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..ROUNDS {
                let priority = if i % 7 == 0 {
                    TaskPriority::Critical
                } else {
                    TaskPriority::Medium
                };
                let id = manager
                    .create_task(
                        NewTask::new(format!("job {n}-{i}"), specialization).with_priority(priority),
                    )
                    .unwrap();
                let _ = manager.assign_task(id);
            }
        }));
    }

    {
        let manager = manager.clone();
        let barrier = barrier.clone();
        let completions = completions.clone();
        workers.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..ROUNDS {
                for id in held_tasks(&manager) {
                    if let Ok(CompletionOutcome::Completed { .. }) = manager.complete_task(id, None) {
                        completions.fetch_add(1, Ordering::SeqCst);
                    }
                }
                thread::yield_now();
            }
        }));
    }

    {
        let manager = manager.clone();
        let barrier = barrier.clone();
        workers.push(thread::spawn(move || {
            barrier.wait();
            for round in 0..ROUNDS {
                if let Some(id) = held_tasks(&manager).into_iter().nth(round % 3) {
                    let _ = manager.reassign_task(id, "operator shuffle");
                }
                thread::yield_now();
            }
        }));
    }

    {
        let manager = manager.clone();
        let barrier = barrier.clone();
        workers.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..ROUNDS {
                clock.advance(Duration::seconds(5));
                manager.tick();
            }
        }));
    }

    for worker in workers {
        worker.join().unwrap();
    }

    assert_consistent(&manager);

    // Every completion was counted exactly once.
    let completed = manager
        .list_tasks(&TaskFilter {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        })
        .len();
    assert_eq!(completed, completions.load(Ordering::SeqCst));

    // Drain whatever is left and check nothing was lost along the way.
    for _ in 0..(4 * ROUNDS) {
        for id in held_tasks(&manager) {
            manager.complete_task(id, None).unwrap();
        }
        manager.tick();
    }
    assert_consistent(&manager);
    for task in manager.list_tasks(&TaskFilter::default()) {
        assert_eq!(task.status, TaskStatus::Completed, "{} left behind", task.title);
    }
}

#[test]
fn racing_assignments_of_one_task_take_one_slot() {
    let (manager, _clock) = shared_manager();
    let id = manager
        .create_task(NewTask::new("Rotate keys", Specialization::Security))
        .unwrap();
    let barrier = Arc::new(Barrier::new(8));

    let wins: usize = (0..8)
        .map(|_| {
            let manager = manager.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                manager.assign_task(id).is_ok()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().unwrap() as usize)
        .sum();

    assert_eq!(wins, 1);
    let agent = manager.get_agent(&AgentId::new("sec_a")).unwrap();
    assert_eq!(agent.current_tasks, vec![id]);
    assert_consistent(&manager);
}
