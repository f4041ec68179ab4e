// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Message Queue Infrastructure Module
//!
//! Per-agent inboxes behind the [`MessageQueue`] trait. Two backends:
//!
//! - [`LocalMessageQueue`]: in-process, one FIFO partition per receiver.
//! - [`RedisMessageQueue`]: one Redis list per receiver, shared across
//!   coordinator processes.
//!
//! The backend is chosen from `spec.message_queue.backend`. A Redis backend
//! that cannot be reached is reported as [`QueueError::Unavailable`]; the
//! coordinator never falls back to the local queue on its own.

pub mod local;
pub mod redis_queue;

pub use local::LocalMessageQueue;
pub use redis_queue::RedisMessageQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::agent::AgentId;
use crate::domain::message::AgentMessage;
use crate::domain::node_config::{MessageQueueConfig, QueueBackend};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Message queue unavailable: {0}")]
    Unavailable(String),

    #[error("Message encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Message queue backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueHealth {
    pub backend: QueueBackend,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Enqueue for `message.receiver` without waiting for a reader.
    async fn put(&self, message: AgentMessage) -> Result<(), QueueError>;

    /// Pop the oldest message for `agent`, waiting up to `timeout`.
    async fn get(
        &self,
        agent: &AgentId,
        timeout: Duration,
    ) -> Result<Option<AgentMessage>, QueueError>;

    /// Drain everything queued for `agent`, oldest first.
    async fn get_all_for_agent(&self, agent: &AgentId) -> Result<Vec<AgentMessage>, QueueError>;

    async fn pending_count(&self, agent: &AgentId) -> Result<usize, QueueError>;

    async fn health(&self) -> QueueHealth;
}

/// Build the queue selected by configuration.
pub async fn connect_message_queue(
    config: &MessageQueueConfig,
) -> Result<Arc<dyn MessageQueue>, QueueError> {
    match config.backend {
        QueueBackend::Local => Ok(Arc::new(LocalMessageQueue::new())),
        QueueBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                QueueError::Unavailable("redis backend selected without redis_url".to_string())
            })?;
            let queue = RedisMessageQueue::connect(url, &config.key_prefix).await?;
            Ok(Arc::new(queue))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_backend_selected_by_default() {
        let queue = connect_message_queue(&MessageQueueConfig::default())
            .await
            .unwrap();
        let health = queue.health().await;
        assert_eq!(health.backend, QueueBackend::Local);
        assert!(health.healthy);
    }

    #[tokio::test]
    async fn test_redis_without_url_is_unavailable() {
        let config = MessageQueueConfig {
            backend: QueueBackend::Redis,
            redis_url: None,
            ..MessageQueueConfig::default()
        };
        let err = connect_message_queue(&config).await.err().unwrap();
        assert!(matches!(err, QueueError::Unavailable(_)));
    }
}
