// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Redis-backed message queue
//!
//! One list per receiver at `<prefix>:<agent_id>`. Producers `LPUSH`, readers
//! `BRPOP`/`RPOP`, so each list is FIFO. Messages are stored as JSON.
//!
//! Blocking reads open their own connection: a `BRPOP` parked on the shared
//! multiplexed connection would stall every other command behind it.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::{MessageQueue, QueueError, QueueHealth};
use crate::domain::agent::AgentId;
use crate::domain::message::AgentMessage;
use crate::domain::node_config::QueueBackend;

impl From<redis::RedisError> for QueueError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
            QueueError::Unavailable(e.to_string())
        } else {
            QueueError::Backend(e.to_string())
        }
    }
}

pub struct RedisMessageQueue {
    client: Client,
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisMessageQueue {
    /// Connect and `PING`. Any failure is reported as unavailable.
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self, QueueError> {
        let client = Client::open(url)
            .map_err(|e| QueueError::Unavailable(format!("invalid redis url: {}", e)))?;
        let mut connection = client
            .get_connection_manager()
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut connection)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        info!(prefix = key_prefix, "Connected to Redis message queue");
        Ok(Self {
            client,
            connection,
            key_prefix: key_prefix.to_string(),
        })
    }

    pub fn inbox_key(&self, agent: &AgentId) -> String {
        inbox_key(&self.key_prefix, agent)
    }
}

pub(crate) fn inbox_key(prefix: &str, agent: &AgentId) -> String {
    format!("{}:{}", prefix, agent)
}

pub(crate) fn encode(message: &AgentMessage) -> Result<String, QueueError> {
    Ok(serde_json::to_string(message)?)
}

pub(crate) fn decode(payload: &str) -> Result<AgentMessage, QueueError> {
    Ok(serde_json::from_str(payload)?)
}

#[async_trait]
impl MessageQueue for RedisMessageQueue {
    async fn put(&self, message: AgentMessage) -> Result<(), QueueError> {
        let key = self.inbox_key(&message.receiver);
        let payload = encode(&message)?;
        let mut connection = self.connection.clone();
        redis::cmd("LPUSH")
            .arg(&key)
            .arg(payload)
            .query_async::<_, i64>(&mut connection)
            .await?;
        debug!(key = %key, message_id = %message.id, "Queued message");
        Ok(())
    }

    async fn get(
        &self,
        agent: &AgentId,
        timeout: Duration,
    ) -> Result<Option<AgentMessage>, QueueError> {
        let key = self.inbox_key(agent);

        // BRPOP treats 0 as "wait forever"
        if timeout.is_zero() {
            let mut connection = self.connection.clone();
            let payload: Option<String> = redis::cmd("RPOP")
                .arg(&key)
                .query_async(&mut connection)
                .await?;
            return payload.as_deref().map(decode).transpose();
        }

        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut connection)
            .await?;
        popped.map(|(_, payload)| decode(&payload)).transpose()
    }

    async fn get_all_for_agent(&self, agent: &AgentId) -> Result<Vec<AgentMessage>, QueueError> {
        let key = self.inbox_key(agent);
        let mut connection = self.connection.clone();
        let mut messages = Vec::new();
        loop {
            let payload: Option<String> = redis::cmd("RPOP")
                .arg(&key)
                .query_async(&mut connection)
                .await?;
            match payload {
                Some(payload) => messages.push(decode(&payload)?),
                None => break,
            }
        }
        Ok(messages)
    }

    async fn pending_count(&self, agent: &AgentId) -> Result<usize, QueueError> {
        let mut connection = self.connection.clone();
        let len: usize = redis::cmd("LLEN")
            .arg(self.inbox_key(agent))
            .query_async(&mut connection)
            .await?;
        Ok(len)
    }

    async fn health(&self) -> QueueHealth {
        let mut connection = self.connection.clone();
        let ping = redis::cmd("PING")
            .query_async::<_, String>(&mut connection)
            .await;
        QueueHealth {
            backend: QueueBackend::Redis,
            healthy: ping.is_ok(),
            detail: ping.err().map(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{MessagePriority, MessageType};

    #[test]
    fn test_inbox_key_layout() {
        assert_eq!(
            inbox_key("xmrt:inbox", &AgentId::new("security_guardian")),
            "xmrt:inbox:security_guardian"
        );
    }

    #[test]
    fn test_payload_preserves_message() {
        let message = AgentMessage::new(
            AgentId::new("defi_specialist"),
            AgentId::new("security_guardian"),
            "Review pool 7",
            MessageType::Coordination,
        )
        .with_priority(MessagePriority::High)
        .requiring_response()
        .with_metadata("pool", serde_json::json!(7));

        let payload = encode(&message).unwrap();
        assert_eq!(decode(&payload).unwrap(), message);
    }

    #[test]
    fn test_garbage_payload_is_encoding_error() {
        assert!(matches!(decode("not json"), Err(QueueError::Encoding(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_fast() {
        let result = RedisMessageQueue::connect("redis://127.0.0.1:1", "xmrt:inbox").await;
        assert!(matches!(result, Err(QueueError::Unavailable(_))));
    }
}
