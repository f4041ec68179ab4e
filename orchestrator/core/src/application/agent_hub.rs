// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Message hub
//!
//! Routes [`AgentMessage`]s through the configured [`MessageQueue`] after
//! checking the receiver against the [`AgentRegistry`], and keeps a bounded
//! in-memory history for operators.
//!
//! The assignment dispatcher turns scheduler events into inbox messages, so
//! an agent learns about new work by polling its own inbox.

use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::registry::AgentRegistry;
use crate::domain::agent::AgentId;
use crate::domain::events::CoordinationEvent;
use crate::domain::message::{AgentMessage, MessageId, MessagePriority, MessageType};
use crate::domain::node_config::MessageQueueConfig;
use crate::infrastructure::event_bus::{EventBus, EventBusError};
use crate::infrastructure::message_queue::{MessageQueue, QueueError, QueueHealth};

/// Sender id used for messages the coordinator itself produces.
pub const COORDINATOR_SENDER: &str = "coordinator";

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Unknown receiver: {0}")]
    UnknownReceiver(AgentId),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub struct AgentHub {
    queue: Arc<dyn MessageQueue>,
    registry: Arc<AgentRegistry>,
    event_bus: EventBus,
    history: Mutex<VecDeque<AgentMessage>>,
    history_capacity: usize,
    receive_timeout: Duration,
}

impl AgentHub {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        registry: Arc<AgentRegistry>,
        event_bus: EventBus,
        config: &MessageQueueConfig,
    ) -> Self {
        Self {
            queue,
            registry,
            event_bus,
            history: Mutex::new(VecDeque::new()),
            history_capacity: config.history_capacity.max(1),
            receive_timeout: Duration::from_millis(config.receive_timeout_ms),
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Send to a registered receiver.
    pub async fn send_message(&self, message: AgentMessage) -> Result<MessageId, HubError> {
        if !self.registry.contains(&message.receiver) {
            return Err(HubError::UnknownReceiver(message.receiver));
        }
        self.deliver(message).await
    }

    async fn deliver(&self, message: AgentMessage) -> Result<MessageId, HubError> {
        let id = message.id;
        let event = CoordinationEvent::MessageSent {
            message_id: id,
            sender: message.sender.clone(),
            receiver: message.receiver.clone(),
            message_type: message.message_type,
            sent_at: message.timestamp,
        };

        self.queue.put(message.clone()).await?;
        self.remember(message);
        self.event_bus.publish(event);
        Ok(id)
    }

    fn remember(&self, message: AgentMessage) {
        let mut history = self.history.lock();
        if history.len() == self.history_capacity {
            history.pop_front();
        }
        history.push_back(message);
    }

    /// One copy per active agent other than the sender.
    pub async fn broadcast(
        &self,
        sender: AgentId,
        content: &str,
        message_type: MessageType,
    ) -> Result<Vec<MessageId>, HubError> {
        let mut sent = Vec::new();
        for receiver in self.registry.active_agent_ids() {
            if receiver == sender {
                continue;
            }
            let message = AgentMessage::new(sender.clone(), receiver, content, message_type);
            sent.push(self.deliver(message).await?);
        }
        info!(sender = %sender, recipients = sent.len(), "Broadcast sent");
        Ok(sent)
    }

    /// Wait for the next message; `None` uses the configured receive timeout.
    pub async fn receive(
        &self,
        agent: &AgentId,
        timeout: Option<Duration>,
    ) -> Result<Option<AgentMessage>, HubError> {
        let timeout = timeout.unwrap_or(self.receive_timeout);
        Ok(self.queue.get(agent, timeout).await?)
    }

    pub async fn drain_inbox(&self, agent: &AgentId) -> Result<Vec<AgentMessage>, HubError> {
        let messages = self.queue.get_all_for_agent(agent).await?;
        debug!(agent_id = %agent, count = messages.len(), "Drained inbox");
        Ok(messages)
    }

    pub async fn pending_count(&self, agent: &AgentId) -> Result<usize, HubError> {
        Ok(self.queue.pending_count(agent).await?)
    }

    /// The last `limit` messages sent, oldest first.
    pub fn recent_history(&self, limit: usize) -> Vec<AgentMessage> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub async fn queue_health(&self) -> QueueHealth {
        self.queue.health().await
    }

    fn inbox_message_for(event: &CoordinationEvent) -> Option<AgentMessage> {
        let coordinator = AgentId::new(COORDINATOR_SENDER);
        match event {
            CoordinationEvent::TaskAssigned {
                task_id,
                agent_id,
                title,
                score,
                ..
            } => Some(
                AgentMessage::new(
                    coordinator,
                    agent_id.clone(),
                    format!("Task assigned: {}", title),
                    MessageType::TaskAssignment,
                )
                .with_priority(MessagePriority::High)
                .with_metadata("task_id", json!(task_id))
                .with_metadata("score", json!(score)),
            ),
            CoordinationEvent::CoordinationTaskSpawned {
                task_id,
                parent_task_id,
                rule,
                agent_id,
                title,
                ..
            } => Some(
                AgentMessage::new(
                    coordinator,
                    agent_id.clone(),
                    format!("Coordination requested: {}", title),
                    MessageType::Coordination,
                )
                .requiring_response()
                .with_metadata("task_id", json!(task_id))
                .with_metadata("parent_task_id", json!(parent_task_id))
                .with_metadata("rule", json!(rule)),
            ),
            _ => None,
        }
    }

    /// Forward assignment and coordination events to agent inboxes until
    /// `token` is cancelled.
    pub fn spawn_assignment_dispatcher(
        self: Arc<Self>,
        event_bus: &EventBus,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let mut receiver = event_bus.subscribe();
        tokio::spawn(async move {
            info!("Assignment dispatcher started");
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = receiver.recv() => event,
                };

                match event {
                    Ok(event) => {
                        let Some(message) = Self::inbox_message_for(&event) else {
                            continue;
                        };
                        let receiver_id = message.receiver.clone();
                        if let Err(e) = self.deliver(message).await {
                            warn!(agent_id = %receiver_id, error = %e, "Failed to deliver assignment notice");
                        }
                    }
                    Err(EventBusError::Lagged(n)) => {
                        warn!("Assignment dispatcher missed {} events", n);
                    }
                    Err(EventBusError::Closed) => break,
                    Err(EventBusError::Empty) => continue,
                }
            }
            info!("Assignment dispatcher stopped");
        })
    }
}
