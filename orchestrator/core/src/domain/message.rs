// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Messages
//!
//! Inbox records exchanged through the message hub. A message is owned by the
//! queue until a receiver pops it; after that only the hub's bounded history
//! keeps a copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::domain::agent::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskAssignment,
    TaskUpdate,
    Coordination,
    Query,
    Response,
    Broadcast,
    Alert,
}

/// Delivery priority, 1 (low) to 3 (high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessagePriority {
    Low = 1,
    Normal = 2,
    High = 3,
}

impl Default for MessagePriority {
    fn default() -> Self {
        MessagePriority::Normal
    }
}

impl TryFrom<u8> for MessagePriority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessagePriority::Low),
            2 => Ok(MessagePriority::Normal),
            3 => Ok(MessagePriority::High),
            other => Err(format!("message priority must be 1..=3, got {}", other)),
        }
    }
}

impl From<MessagePriority> for u8 {
    fn from(value: MessagePriority) -> Self {
        value as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: MessageId,
    pub sender: AgentId,
    pub receiver: AgentId,
    pub content: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub priority: MessagePriority,
    #[serde(default)]
    pub requires_response: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentMessage {
    pub fn new(
        sender: AgentId,
        receiver: AgentId,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            receiver,
            content: content.into(),
            message_type,
            timestamp: Utc::now(),
            priority: MessagePriority::default(),
            requires_response: false,
            metadata: HashMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn requiring_response(mut self) -> Self {
        self.requires_response = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
