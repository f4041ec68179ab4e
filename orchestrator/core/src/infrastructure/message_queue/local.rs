// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-process message queue
//!
//! Each receiver owns a FIFO partition and a [`Notify`] used to wake readers
//! blocked in [`MessageQueue::get`]. A reader only ever touches its own
//! partition, so messages for other agents are never popped and requeued.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

use super::{MessageQueue, QueueError, QueueHealth};
use crate::domain::agent::AgentId;
use crate::domain::message::AgentMessage;
use crate::domain::node_config::QueueBackend;

#[derive(Default)]
struct Inbox {
    messages: VecDeque<AgentMessage>,
    notify: Arc<Notify>,
}

#[derive(Default)]
pub struct LocalMessageQueue {
    inboxes: Mutex<HashMap<AgentId, Inbox>>,
}

impl LocalMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn pop(&self, agent: &AgentId) -> Option<AgentMessage> {
        self.inboxes
            .lock()
            .get_mut(agent)
            .and_then(|inbox| inbox.messages.pop_front())
    }

    fn notifier(&self, agent: &AgentId) -> Arc<Notify> {
        self.inboxes
            .lock()
            .entry(agent.clone())
            .or_default()
            .notify
            .clone()
    }
}

#[async_trait]
impl MessageQueue for LocalMessageQueue {
    async fn put(&self, message: AgentMessage) -> Result<(), QueueError> {
        let notify = {
            let mut inboxes = self.inboxes.lock();
            let inbox = inboxes.entry(message.receiver.clone()).or_default();
            debug!(
                receiver = %message.receiver,
                message_id = %message.id,
                depth = inbox.messages.len() + 1,
                "Queued message"
            );
            inbox.messages.push_back(message);
            inbox.notify.clone()
        };
        notify.notify_one();
        Ok(())
    }

    async fn get(
        &self,
        agent: &AgentId,
        timeout: Duration,
    ) -> Result<Option<AgentMessage>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notify = self.notifier(agent);
            let notified = notify.notified();
            tokio::pin!(notified);
            // Register before checking so a put between the check and the
            // await still wakes us.
            notified.as_mut().enable();

            if let Some(message) = self.pop(agent) {
                return Ok(Some(message));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.pop(agent));
            }
        }
    }

    async fn get_all_for_agent(&self, agent: &AgentId) -> Result<Vec<AgentMessage>, QueueError> {
        Ok(self
            .inboxes
            .lock()
            .get_mut(agent)
            .map(|inbox| inbox.messages.drain(..).collect())
            .unwrap_or_default())
    }

    async fn pending_count(&self, agent: &AgentId) -> Result<usize, QueueError> {
        Ok(self
            .inboxes
            .lock()
            .get(agent)
            .map_or(0, |inbox| inbox.messages.len()))
    }

    async fn health(&self) -> QueueHealth {
        QueueHealth {
            backend: QueueBackend::Local,
            healthy: true,
            detail: None,
        }
    }
}
