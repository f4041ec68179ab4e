// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Aggregate
//!
//! Scheduling view of a worker: specialization, declared capabilities,
//! bounded concurrent capacity and a performance score that drifts with
//! on-time versus late delivery.
//!
//! Capabilities are validated tags drawn from a [`CapabilityVocabulary`], so a
//! misspelled tag fails at registration instead of silently never matching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::domain::task::{Specialization, TaskId};

pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 3;
pub const INITIAL_PERFORMANCE_SCORE: f64 = 1.0;
pub const MIN_PERFORMANCE_SCORE: f64 = 0.1;
pub const MAX_PERFORMANCE_SCORE: f64 = 2.0;
/// Multiplicative adjustment applied on each completion.
pub const PERFORMANCE_STEP: f64 = 0.05;

const MAX_CAPABILITY_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Capability tag cannot be empty")]
    Empty,

    #[error("Capability tag '{0}' exceeds 64 characters")]
    TooLong(String),

    #[error("Capability tag '{0}' may only contain a-z, 0-9 and '_'")]
    InvalidCharacters(String),

    #[error("Capability '{0}' is not in the configured vocabulary")]
    NotInVocabulary(String),
}

/// Normalized capability tag (`[a-z0-9_]+`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Capability(String);

impl Capability {
    pub fn parse(raw: &str) -> Result<Self, CapabilityError> {
        let tag = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        if tag.is_empty() {
            return Err(CapabilityError::Empty);
        }
        if tag.len() > MAX_CAPABILITY_LEN {
            return Err(CapabilityError::TooLong(tag));
        }
        if !tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(CapabilityError::InvalidCharacters(raw.to_string()));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Capability {
    type Error = CapabilityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Capability::parse(&value)
    }
}

impl From<Capability> for String {
    fn from(value: Capability) -> Self {
        value.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Built-in capability tags used when the configuration does not list its own.
pub const DEFAULT_CAPABILITIES: &[&str] = &[
    "governance_proposals",
    "voting",
    "treasury_management",
    "policy_analysis",
    "defi_analysis",
    "yield_optimization",
    "liquidity_management",
    "risk_assessment",
    "security_audit",
    "threat_detection",
    "smart_contract_review",
    "incident_response",
    "community_engagement",
    "social_media",
    "content_creation",
    "moderation",
    "code_review",
    "deployment",
    "testing",
    "documentation",
];

/// Closed set of capability tags accepted at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityVocabulary {
    tags: BTreeSet<Capability>,
}

impl CapabilityVocabulary {
    pub fn from_tags<I, S>(tags: I) -> Result<Self, CapabilityError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = tags
            .into_iter()
            .map(|tag| Capability::parse(tag.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { tags })
    }

    pub fn contains(&self, capability: &Capability) -> bool {
        self.tags.contains(capability)
    }

    /// Parse and vocabulary-check raw tags.
    pub fn resolve<I, S>(&self, raw: I) -> Result<BTreeSet<Capability>, CapabilityError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter()
            .map(|tag| {
                let capability = Capability::parse(tag.as_ref())?;
                self.check(&capability)?;
                Ok(capability)
            })
            .collect()
    }

    pub fn check(&self, capability: &Capability) -> Result<(), CapabilityError> {
        if self.contains(capability) {
            Ok(())
        } else {
            Err(CapabilityError::NotInVocabulary(capability.to_string()))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl Default for CapabilityVocabulary {
    fn default() -> Self {
        Self {
            tags: DEFAULT_CAPABILITIES
                .iter()
                .map(|tag| Capability(tag.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub specialization: Specialization,
    pub capabilities: BTreeSet<Capability>,
    pub current_tasks: Vec<TaskId>,
    pub max_concurrent_tasks: usize,
    pub performance_score: f64,
    pub availability: bool,
    pub last_active: DateTime<Utc>,
}

impl Agent {
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        specialization: Specialization,
        capabilities: BTreeSet<Capability>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            specialization,
            capabilities,
            current_tasks: Vec::new(),
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            performance_score: INITIAL_PERFORMANCE_SCORE,
            availability: true,
            last_active: now,
        }
    }

    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max.max(1);
        self
    }

    pub fn load_ratio(&self) -> f64 {
        if self.max_concurrent_tasks == 0 {
            return 1.0;
        }
        self.current_tasks.len() as f64 / self.max_concurrent_tasks as f64
    }

    pub fn has_capacity(&self) -> bool {
        self.current_tasks.len() < self.max_concurrent_tasks
    }

    pub fn capability_matches(&self, required: &BTreeSet<Capability>) -> usize {
        self.capabilities.intersection(required).count()
    }

    /// `performance × (1 − load) × (1 + 0.1 × matched capabilities)`.
    pub fn assignment_score(&self, required: &BTreeSet<Capability>) -> f64 {
        self.performance_score
            * (1.0 - self.load_ratio())
            * (1.0 + 0.1 * self.capability_matches(required) as f64)
    }

    /// Take a slot for `task_id`. Returns `false` when the agent is full or
    /// already holds the task. Taking work is not activity: `last_active`
    /// only moves when the agent itself reports in.
    pub fn take_slot(&mut self, task_id: TaskId) -> bool {
        if !self.has_capacity() || self.current_tasks.contains(&task_id) {
            return false;
        }
        self.current_tasks.push(task_id);
        true
    }

    /// Release the slot held for `task_id`. Returns whether a slot was freed.
    pub fn release_slot(&mut self, task_id: TaskId) -> bool {
        let before = self.current_tasks.len();
        self.current_tasks.retain(|id| *id != task_id);
        before != self.current_tasks.len()
    }

    pub fn record_completion(&mut self, on_time: bool) {
        let factor = if on_time {
            1.0 + PERFORMANCE_STEP
        } else {
            1.0 - PERFORMANCE_STEP
        };
        self.performance_score = (self.performance_score * factor)
            .clamp(MIN_PERFORMANCE_SCORE, MAX_PERFORMANCE_SCORE);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_active = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(tags: &[&str]) -> BTreeSet<Capability> {
        tags.iter().map(|t| Capability::parse(t).unwrap()).collect()
    }

    fn defi_agent() -> Agent {
        Agent::new(
            AgentId::new("defi_specialist"),
            "DeFi Specialist",
            Specialization::Defi,
            capabilities(&["defi_analysis", "yield_optimization"]),
            Utc::now(),
        )
    }

    #[test]
    fn test_capability_normalization() {
        assert_eq!(Capability::parse(" Yield-Optimization ").unwrap().as_str(), "yield_optimization");
        assert_eq!(Capability::parse("").unwrap_err(), CapabilityError::Empty);
        assert!(matches!(
            Capability::parse("drop;table"),
            Err(CapabilityError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn test_vocabulary_rejects_unknown_tags() {
        let vocabulary = CapabilityVocabulary::default();
        assert!(vocabulary.resolve(["security_audit", "voting"]).is_ok());

        let err = vocabulary.resolve(["securty_audit"]).unwrap_err();
        assert_eq!(err, CapabilityError::NotInVocabulary("securty_audit".to_string()));
    }

    #[test]
    fn test_capability_deserialization_validates() {
        let ok: Capability = serde_json::from_str("\"Code-Review\"").unwrap();
        assert_eq!(ok.as_str(), "code_review");
        assert!(serde_json::from_str::<Capability>("\"bad tag!\"").is_err());
    }

    #[test]
    fn test_assignment_score_formula() {
        let mut agent = defi_agent();
        let required = capabilities(&["defi_analysis"]);

        // Idle agent, one matching capability: 1.0 * 1.0 * 1.1
        assert!((agent.assignment_score(&required) - 1.1).abs() < 1e-9);

        agent.take_slot(TaskId::new());
        // One of three slots used: 1.0 * (2/3) * 1.1
        assert!((agent.assignment_score(&required) - (2.0 / 3.0) * 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_slots_respect_capacity() {
        let mut agent = defi_agent().with_max_concurrent_tasks(2);
        assert!(agent.take_slot(TaskId::new()));
        assert!(agent.take_slot(TaskId::new()));
        assert!(!agent.take_slot(TaskId::new()));
        assert_eq!(agent.current_tasks.len(), 2);
    }

    #[test]
    fn test_taking_a_slot_is_not_activity() {
        let mut agent = defi_agent();
        let before = agent.last_active;
        agent.take_slot(TaskId::new());
        assert_eq!(agent.last_active, before);
    }

    #[test]
    fn test_release_slot_only_once() {
        let mut agent = defi_agent();
        let task = TaskId::new();
        agent.take_slot(task);
        assert!(agent.release_slot(task));
        assert!(!agent.release_slot(task));
    }

    #[test]
    fn test_performance_score_bounds() {
        let mut agent = defi_agent();
        agent.record_completion(true);
        assert!((agent.performance_score - 1.05).abs() < 1e-9);

        for _ in 0..200 {
            agent.record_completion(true);
        }
        assert_eq!(agent.performance_score, MAX_PERFORMANCE_SCORE);

        for _ in 0..500 {
            agent.record_completion(false);
        }
        assert_eq!(agent.performance_score, MIN_PERFORMANCE_SCORE);
    }
}
