// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Background scheduler loop
//!
//! Calls [`TaskManager::tick`] on a fixed interval until its cancellation
//! token fires. Missed ticks are delayed rather than replayed in a burst.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::task_manager::TaskManager;

pub struct TaskScheduler;

impl TaskScheduler {
    pub fn spawn(
        manager: Arc<TaskManager>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = interval.as_millis() as u64, "Scheduler loop started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = manager.tick();
                        if !report.assigned.is_empty() || !report.reassigned.is_empty() {
                            debug!(
                                assigned = report.assigned.len(),
                                reassigned = report.reassigned.len(),
                                "Scheduler pass changed state"
                            );
                        }
                    }
                }
            }

            info!("Scheduler loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::task_manager::TaskManagerConfig;
    use crate::domain::agent::{Agent, AgentId};
    use crate::domain::clock::SystemClock;
    use crate::domain::coordination::RuleSet;
    use crate::domain::task::{NewTask, Specialization, TaskStatus};
    use crate::infrastructure::event_bus::EventBus;
    use chrono::Utc;

    #[tokio::test]
    async fn test_loop_assigns_and_stops_on_cancel() {
        let manager = Arc::new(TaskManager::new(
            TaskManagerConfig::default(),
            RuleSet::standard(),
            EventBus::new(64),
            Arc::new(SystemClock),
        ));
        manager
            .register_agent(Agent::new(
                AgentId::new("builder"),
                "Builder",
                Specialization::Development,
                Default::default(),
                Utc::now(),
            ))
            .unwrap();
        let id = manager
            .create_task(NewTask::new("Ship release", Specialization::Development))
            .unwrap();

        let token = CancellationToken::new();
        let handle = TaskScheduler::spawn(manager.clone(), Duration::from_millis(10), token.clone());

        let mut assigned = false;
        for _ in 0..100 {
            if manager.get_task(id).unwrap().status == TaskStatus::Assigned {
                assigned = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(assigned);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
