// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Agent registry
//!
//! Directory of known agents, their declared capabilities and liveness. It
//! answers "who can do X" for the message hub and the HTTP API; scheduling
//! state (load, performance) lives in the task manager.
//!
//! Liveness only changes when an agent (or an operator) reports it. Nothing
//! here expires entries on a timer.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::domain::agent::{AgentId, Capability, CapabilityError, CapabilityVocabulary};
use crate::domain::clock::Clock;
use crate::domain::events::CoordinationEvent;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentLiveness {
    Active,
    Busy,
    Offline,
}

impl AgentLiveness {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentLiveness::Active => "active",
            AgentLiveness::Busy => "busy",
            AgentLiveness::Offline => "offline",
        }
    }
}

impl fmt::Display for AgentLiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentLiveness {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(AgentLiveness::Active),
            "busy" => Ok(AgentLiveness::Busy),
            "offline" => Ok(AgentLiveness::Offline),
            other => Err(RegistryError::Validation(format!(
                "unknown agent status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: AgentId,
    pub name: String,
    pub capabilities: BTreeSet<Capability>,
    /// Informational; never dialed by the coordinator.
    pub endpoint: Option<String>,
    pub status: AgentLiveness,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error(transparent)]
    InvalidCapability(#[from] CapabilityError),

    #[error("Invalid request: {0}")]
    Validation(String),
}

pub struct AgentRegistry {
    entries: RwLock<HashMap<AgentId, RegistryEntry>>,
    vocabulary: CapabilityVocabulary,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl AgentRegistry {
    pub fn new(vocabulary: CapabilityVocabulary, event_bus: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            vocabulary,
            event_bus,
            clock,
        }
    }

    pub fn vocabulary(&self) -> &CapabilityVocabulary {
        &self.vocabulary
    }

    /// Register or refresh an agent. Re-registration keeps `registered_at`
    /// and marks the agent active again.
    pub fn register_agent<I, S>(
        &self,
        id: AgentId,
        name: impl Into<String>,
        capabilities: I,
        endpoint: Option<String>,
    ) -> Result<RegistryEntry, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if id.as_str().trim().is_empty() {
            return Err(RegistryError::Validation("agent id cannot be empty".to_string()));
        }
        let capabilities = self.vocabulary.resolve(capabilities)?;
        let now = self.clock.now();

        let entry = {
            let mut entries = self.entries.write();
            let registered_at = entries.get(&id).map_or(now, |e| e.registered_at);
            let entry = RegistryEntry {
                id: id.clone(),
                name: name.into(),
                capabilities,
                endpoint,
                status: AgentLiveness::Active,
                registered_at,
                last_seen: now,
            };
            entries.insert(id.clone(), entry.clone());
            entry
        };

        info!(agent_id = %id, capabilities = entry.capabilities.len(), "Agent registered");
        self.event_bus.publish(CoordinationEvent::AgentRegistered {
            agent_id: id,
            registered_at: now,
        });
        Ok(entry)
    }

    /// Active agents declaring `capability`, ordered by id.
    pub fn get_agents_by_capability(&self, capability: &str) -> Result<Vec<RegistryEntry>, RegistryError> {
        let capability = Capability::parse(capability)?;
        let mut matches: Vec<RegistryEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| e.status == AgentLiveness::Active && e.capabilities.contains(&capability))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    pub fn update_agent_status(
        &self,
        id: &AgentId,
        status: AgentLiveness,
    ) -> Result<RegistryEntry, RegistryError> {
        let now = self.clock.now();
        let entry = {
            let mut entries = self.entries.write();
            let entry = entries
                .get_mut(id)
                .ok_or_else(|| RegistryError::AgentNotFound(id.clone()))?;
            entry.status = status;
            entry.last_seen = now;
            entry.clone()
        };

        self.event_bus.publish(CoordinationEvent::AgentStatusChanged {
            agent_id: id.clone(),
            status: status.as_str().to_string(),
            changed_at: now,
        });
        Ok(entry)
    }

    pub fn get_agent(&self, id: &AgentId) -> Option<RegistryEntry> {
        self.entries.read().get(id).cloned()
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn list_agents(&self) -> Vec<RegistryEntry> {
        let mut entries: Vec<RegistryEntry> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    pub fn active_agent_ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self
            .entries
            .read()
            .values()
            .filter(|e| e.status == AgentLiveness::Active)
            .map(|e| e.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn unregister_agent(&self, id: &AgentId) -> Result<RegistryEntry, RegistryError> {
        let removed = self
            .entries
            .write()
            .remove(id)
            .ok_or_else(|| RegistryError::AgentNotFound(id.clone()))?;
        info!(agent_id = %id, "Agent unregistered");
        Ok(removed)
    }
}
